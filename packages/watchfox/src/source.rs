//! Server-sent event source for the minifox feed.
//!
//! Converts a raw `reqwest` byte stream into [`ServerSentEvent`] values.
//! Handles partial lines, multi-line `data:` fields, comments, and chunk
//! boundaries that fall inside a multi-byte character.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::{debug, info};

use crate::error::SourceError;
use crate::event::ServerSentEvent;

/// Event name used when a block has no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Open the feed at `url`.
///
/// The request has no timeout: the feed stays open as long as minifox runs.
pub async fn connect(url: &str) -> Result<SseStream, SourceError> {
    info!(%url, "connecting to event stream");

    let response = reqwest::Client::new()
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .map_err(|e| SourceError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    info!(%url, "event stream connected");

    Ok(SseStream::new(response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| SourceError::Network(e.to_string()))
    })))
}

/// Stream adapter that converts raw SSE bytes into [`ServerSentEvent`] values.
///
/// Ends after the first error.
pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>,
    buffer: Vec<u8>,
    block: Block,
    last_event_id: Option<String>,
    finished: bool,
}

/// Fields of the event currently being read.
#[derive(Default)]
struct Block {
    event: Option<String>,
    data: Vec<String>,
    retry: Option<u64>,
}

impl SseStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<Bytes, SourceError>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
            block: Block::default(),
            last_event_id: None,
            finished: false,
        }
    }

    /// Consume complete lines until one ends an event.
    fn next_event(&mut self) -> Option<Result<ServerSentEvent, SourceError>> {
        loop {
            let newline = self.buffer.iter().position(|b| *b == b'\n')?;
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(SourceError::Framing(format!(
                        "invalid UTF-8 in stream: {}",
                        e
                    ))))
                }
            };

            if let Some(event) = self.process_line(&line) {
                return Some(Ok(event));
            }
        }
    }

    fn process_line(&mut self, line: &str) -> Option<ServerSentEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.block.event = Some(value.to_string()),
            "data" => self.block.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.block.retry = Some(retry);
                }
            }
            other => debug!(field = other, "ignoring unknown sse field"),
        }
        None
    }

    /// End the current block. Blocks without data produce no event.
    fn dispatch(&mut self) -> Option<ServerSentEvent> {
        let block = std::mem::take(&mut self.block);
        if block.data.is_empty() {
            return None;
        }
        Some(ServerSentEvent {
            event: block
                .event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
            data: block.data.join("\n"),
            id: self.last_event_id.clone(),
            retry: block.retry,
        })
    }
}

impl Stream for SseStream {
    type Item = Result<ServerSentEvent, SourceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            if let Some(item) = this.next_event() {
                if item.is_err() {
                    this.finished = true;
                }
                return Poll::Ready(Some(item));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    // An event only counts once its terminating blank line arrives
                    if !this.buffer.is_empty() || !this.block.data.is_empty() {
                        debug!(
                            buffered = this.buffer.len(),
                            "discarding incomplete event at end of stream"
                        );
                    }
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn sse(chunks: &[&[u8]]) -> SseStream {
        let chunks: Vec<Result<Bytes, SourceError>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        SseStream::new(stream::iter(chunks))
    }

    async fn collect(stream: SseStream) -> Vec<Result<ServerSentEvent, SourceError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_named_event() {
        let events = collect(sse(&[
            b"event: match_end\ndata: {\"id\":\"g1\",\"result\":\"Draw\"}\n\n",
        ]))
        .await;

        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.event, "match_end");
        assert_eq!(event.json().unwrap()["result"], "Draw");
    }

    #[tokio::test]
    async fn test_fields_split_across_chunks_and_crlf() {
        let events = collect(sse(&[
            b"event: match_",
            b"move\r\ndata: {\"id\":",
            b"\"g1\"}\r\n",
            b"\r\n",
        ]))
        .await;

        let event = events[0].as_ref().unwrap();
        assert_eq!(event.event, "match_move");
        assert_eq!(event.data, r#"{"id":"g1"}"#);
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let text = "event: match_chat\ndata: 你好\n\n".as_bytes();
        let split = text.len() - 4;
        let events = collect(sse(&[&text[..split], &text[split..]])).await;

        assert_eq!(events[0].as_ref().unwrap().data, "你好");
    }

    #[tokio::test]
    async fn test_comments_multiline_data_and_default_name() {
        let events = collect(sse(&[
            b": keep-alive\n\n",
            b"data: first\ndata: second\nid: 7\nretry: 3000\n\n",
        ]))
        .await;

        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.event, DEFAULT_EVENT_NAME);
        assert_eq!(event.data, "first\nsecond");
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.retry, Some(3000));
    }

    #[tokio::test]
    async fn test_incomplete_event_at_eof_is_dropped() {
        let events = collect(sse(&[
            b"event: match_end\ndata: {}\n\n",
            b"event: match_start\ndata: {}\n",
        ]))
        .await;

        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_a_framing_error() {
        let events = collect(sse(&[b"data: \xff\xfe\n\n", b"data: later\n\n"])).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(SourceError::Framing(_))));
    }

    #[tokio::test]
    async fn test_network_error_ends_stream() {
        let chunks: Vec<Result<Bytes, SourceError>> = vec![
            Ok(Bytes::from_static(b"event: match_end\ndata: {}\n\n")),
            Err(SourceError::Network("connection reset".into())),
            Ok(Bytes::from_static(b"event: match_end\ndata: {}\n\n")),
        ];
        let events = collect(SseStream::new(stream::iter(chunks))).await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(SourceError::Network(_))));
    }
}
