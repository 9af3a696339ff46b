//! Recording feed events to disk and replaying them.
//!
//! A recording is a JSON Lines file with one [`RecordedEvent`] per line, in
//! arrival order:
//!
//! ```text
//! {"received_at":"2024-05-01T10:00:00Z","event":"match_start","data":"{...}"}
//! {"received_at":"2024-05-01T10:00:02Z","event":"match_move","data":"{...}"}
//! ```
//!
//! Replaying reproduces the same event sequence, optionally filtered and
//! paced, so it can be fed to an [`Engine`](crate::Engine) in place of the
//! live feed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio_stream::wrappers::LinesStream;
use tracing::info;

use crate::error::SourceError;
use crate::event::ServerSentEvent;

/// One line of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ServerSentEvent,
}

/// Appends events to a recording, flushing after each one so a killed
/// recorder loses at most the event being written.
pub struct EventRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl EventRecorder {
    /// Open `path`, truncating it unless `append` is set.
    pub async fn create(path: impl AsRef<Path>, append: bool) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await?;
        info!(path = %path.display(), append, "recording events");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub async fn record(&mut self, event: &ServerSentEvent) -> Result<(), SourceError> {
        let record = RecordedEvent {
            received_at: Utc::now(),
            event: event.clone(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| SourceError::Io(std::io::Error::other(e)))?;
        line.push('\n');

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        self.written += 1;
        info!(event = %event.event, written = self.written, "recorded event");
        Ok(())
    }

    /// Events written through this recorder.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy `events` into the recording at `path` until the stream ends.
///
/// Returns the number of events written. A source failure is returned after
/// everything received before it has been flushed.
pub async fn record_events<S>(
    path: impl AsRef<Path>,
    append: bool,
    events: S,
) -> Result<u64, SourceError>
where
    S: Stream<Item = Result<ServerSentEvent, SourceError>>,
{
    let mut recorder = EventRecorder::create(path, append).await?;

    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        recorder.record(&event?).await?;
    }

    info!(
        path = %recorder.path().display(),
        written = recorder.written(),
        "recording finished"
    );
    Ok(recorder.written())
}

/// Read a recording back in order.
///
/// The stream ends after the first corrupt or unreadable line.
pub async fn recorded_events(
    path: impl AsRef<Path>,
) -> Result<impl Stream<Item = Result<RecordedEvent, SourceError>>, SourceError> {
    let file = File::open(path.as_ref()).await?;
    let lines = LinesStream::new(BufReader::new(file).lines());

    Ok(lines
        .enumerate()
        .filter_map(|(index, line)| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str::<RecordedEvent>(&line).map_err(|e| {
                    SourceError::Corrupt {
                        line: index + 1,
                        message: e.to_string(),
                    }
                })),
                Err(e) => Some(Err(SourceError::Io(e))),
            }
        })
        .scan(false, |failed, record| {
            if *failed {
                return future::ready(None);
            }
            *failed = record.is_err();
            future::ready(Some(record))
        }))
}

/// Which event names a replay delivers.
///
/// A non-empty allow-list is applied first; the deny-list then removes names
/// from whatever remains.
#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    pub allow: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

impl ReplayFilter {
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            deny: deny.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        (self.allow.is_empty() || self.allow.contains(name)) && !self.deny.contains(name)
    }
}

/// Replay the recording at `path` as a live-like event source.
///
/// `delay` is slept before each delivered event. Filtered-out events cost no
/// delay. A corrupt line ends the stream with an error, like a broken feed.
pub async fn replay(
    path: impl AsRef<Path>,
    filter: ReplayFilter,
    delay: Duration,
) -> Result<impl Stream<Item = Result<ServerSentEvent, SourceError>>, SourceError> {
    let path = path.as_ref().to_path_buf();
    let records = recorded_events(path.clone()).await?;
    info!(path = %path.display(), ?delay, ?filter, "replaying events");

    let filtered = records.filter_map(move |record| {
        let keep = match &record {
            Ok(record) => filter.allows(&record.event.event),
            Err(_) => true,
        };
        async move { keep.then(|| record.map(|r| r.event)) }
    });

    Ok(filtered.then(move |item| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        item
    }))
}

/// An in-memory source, for tests and demos.
pub fn events_from(
    events: Vec<ServerSentEvent>,
) -> impl Stream<Item = Result<ServerSentEvent, SourceError>> {
    stream::iter(events.into_iter().map(Ok))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn chat(nick: &str) -> ServerSentEvent {
        ServerSentEvent::with_json(
            "match_chat",
            &json!({"id": "g1", "country": "JP", "nick": nick, "rank": "1d", "message": "gg"}),
        )
    }

    #[test]
    fn test_filter_rules() {
        let all = ReplayFilter::default();
        assert!(all.allows("match_chat"));

        let only_moves = ReplayFilter::new(["match_move"], Vec::<String>::new());
        assert!(only_moves.allows("match_move"));
        assert!(!only_moves.allows("match_chat"));

        let both = ReplayFilter::new(["match_move", "match_chat"], ["match_chat"]);
        assert!(both.allows("match_move"));
        assert!(!both.allows("match_chat"));
    }

    #[tokio::test]
    async fn test_record_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let written = record_events(&path, false, events_from(vec![chat("a"), chat("b")]))
            .await
            .unwrap();
        assert_eq!(written, 2);

        let records: Vec<_> = recorded_events(&path).await.unwrap().collect().await;
        let nicks: Vec<String> = records
            .into_iter()
            .map(|r| r.unwrap().event.json().unwrap()["nick"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(nicks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_append_keeps_earlier_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        record_events(&path, false, events_from(vec![chat("a")])).await.unwrap();
        record_events(&path, true, events_from(vec![chat("b")])).await.unwrap();
        assert_eq!(recorded_events(&path).await.unwrap().count().await, 2);

        record_events(&path, false, events_from(vec![chat("c")])).await.unwrap();
        assert_eq!(recorded_events(&path).await.unwrap().count().await, 1);
    }

    #[tokio::test]
    async fn test_source_failure_is_returned_after_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let events = stream::iter(vec![
            Ok(chat("a")),
            Err(SourceError::Network("reset".into())),
        ]);

        let err = record_events(&path, false, events).await.unwrap_err();
        assert!(matches!(err, SourceError::Network(_)));
        assert_eq!(recorded_events(&path).await.unwrap().count().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_line_reports_line_number() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let good = serde_json::to_string(&RecordedEvent {
            received_at: Utc::now(),
            event: chat("a"),
        })
        .unwrap();
        tokio::fs::write(&path, format!("{}\n\n{{not json\n", good))
            .await
            .unwrap();

        let records: Vec<_> = recorded_events(&path).await.unwrap().collect().await;
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(SourceError::Corrupt { line: 3, .. })));
    }

    #[tokio::test]
    async fn test_replay_stops_at_first_corrupt_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let line = |nick: &str| {
            serde_json::to_string(&RecordedEvent {
                received_at: Utc::now(),
                event: chat(nick),
            })
            .unwrap()
        };
        tokio::fs::write(&path, format!("{}\n{{not json\n{}\n", line("a"), line("b")))
            .await
            .unwrap();

        let events: Vec<_> = replay(&path, ReplayFilter::default(), Duration::ZERO)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().event, "match_chat");
        assert!(matches!(events[1], Err(SourceError::Corrupt { line: 2, .. })));
    }

    #[tokio::test]
    async fn test_replay_sleeps_before_each_delivered_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let end = ServerSentEvent::with_json("match_end", &json!({"id": "g1", "result": "Draw"}));
        record_events(&path, false, events_from(vec![chat("a"), end, chat("b")]))
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let filter = ReplayFilter::new(Vec::<String>::new(), ["match_chat"]);
        let events: Vec<_> = replay(&path, filter, Duration::from_millis(40))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().event, "match_end");
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
