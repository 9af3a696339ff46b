//! WebSocket connection to a running OBS instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{ObsError, Result};
use crate::protocol::{
    self, Frame, Hello, Identify, Request, RequestResponse, OP_EVENT, OP_HELLO, OP_IDENTIFIED,
    OP_IDENTIFY, OP_REQUEST, OP_REQUEST_RESPONSE, RPC_VERSION,
};
use crate::Requester;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = DashMap<String, oneshot::Sender<Result<Value>>>;

/// Connection settings for [`ObsClient`].
#[derive(Debug, Clone)]
pub struct ObsOptions {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for ObsOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl ObsOptions {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Request client for OBS WebSocket v5.
///
/// Cheap to clone. Requests from concurrent tasks are serialized on the
/// socket writer and matched back to their callers by request id, so a single
/// client can be shared by every handler of a dispatch run.
#[derive(Clone)]
pub struct ObsClient {
    inner: Arc<Inner>,
}

struct Inner {
    writer: Mutex<SplitSink<WsStream, Message>>,
    pending: Arc<Pending>,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl ObsClient {
    /// Connect and complete the Hello/Identify handshake.
    pub async fn connect(options: ObsOptions) -> Result<Self> {
        let url = options.url();
        info!(%url, "connecting to obs");

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ObsError::Connect {
                url: url.clone(),
                message: e.to_string(),
            })?;
        let (mut writer, mut reader) = ws.split();

        let hello: Hello = serde_json::from_value(expect_frame(&mut reader, OP_HELLO).await?)
            .map_err(|e| ObsError::Protocol(format!("invalid Hello: {}", e)))?;
        debug!(
            version = ?hello.obs_web_socket_version,
            rpc_version = hello.rpc_version,
            auth_required = hello.authentication.is_some(),
            "received obs hello"
        );

        let authentication = match (&hello.authentication, &options.password) {
            (Some(challenge), Some(password)) => {
                Some(protocol::authentication(password, challenge))
            }
            (Some(_), None) => {
                return Err(ObsError::Auth(
                    "server requires a password but none is configured".into(),
                ))
            }
            (None, _) => None,
        };

        let identify = Frame::new(
            OP_IDENTIFY,
            Identify {
                rpc_version: RPC_VERSION,
                authentication,
                event_subscriptions: 0,
            },
        )
        .map_err(|e| ObsError::Protocol(e.to_string()))?;
        send_frame(&mut writer, &identify).await?;

        // OBS closes the socket instead of answering when authentication fails
        match expect_frame(&mut reader, OP_IDENTIFIED).await {
            Ok(_) => {}
            Err(ObsError::Closed) => {
                return Err(ObsError::Auth("connection closed during identify".into()))
            }
            Err(e) => return Err(e),
        }
        info!(%url, "obs connection identified");

        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let reader = tokio::spawn(read_loop(reader, pending.clone()));

        Ok(Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(writer),
                pending,
                timeout: options.timeout,
                reader,
            }),
        })
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }
}

#[async_trait]
impl Requester for ObsClient {
    async fn send(&self, request_type: &str, request_data: Option<Value>) -> Result<Value> {
        let request_id = Uuid::new_v4().to_string();
        let frame = Frame::new(
            OP_REQUEST,
            Request {
                request_type,
                request_id: &request_id,
                request_data,
            },
        )
        .map_err(|e| ObsError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(request_id.clone(), tx);

        trace!(request_type, %request_id, "sending obs request");
        {
            let mut writer = self.inner.writer.lock().await;
            if let Err(e) = send_frame(&mut writer, &frame).await {
                self.inner.pending.remove(&request_id);
                return Err(e);
            }
        }

        match tokio::time::timeout(self.inner.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ObsError::Closed),
            Err(_) => {
                self.inner.pending.remove(&request_id);
                warn!(request_type, %request_id, "obs request timed out");
                Err(ObsError::Timeout {
                    request_type: request_type.to_string(),
                    duration: self.inner.timeout,
                })
            }
        }
    }
}

impl std::fmt::Debug for ObsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsClient")
            .field("pending_requests", &self.inner.pending.len())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

async fn send_frame(writer: &mut SplitSink<WsStream, Message>, frame: &Frame) -> Result<()> {
    let text = serde_json::to_string(frame).map_err(|e| ObsError::Protocol(e.to_string()))?;
    writer
        .send(Message::Text(text))
        .await
        .map_err(|_| ObsError::Closed)
}

/// Read frames until one with `op` arrives. Pings and unrelated ops are skipped.
async fn expect_frame(reader: &mut SplitStream<WsStream>, op: u8) -> Result<Value> {
    while let Some(message) = reader.next().await {
        let message = message.map_err(|_| ObsError::Closed)?;
        let Some(frame) = parse_frame(message)? else {
            continue;
        };
        if frame.op == op {
            return Ok(frame.d);
        }
        trace!(op = frame.op, expected = op, "skipping frame during handshake");
    }
    Err(ObsError::Closed)
}

fn parse_frame(message: Message) -> Result<Option<Frame>> {
    match message {
        Message::Text(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ObsError::Protocol(format!("invalid frame: {}", e))),
        Message::Close(_) => Err(ObsError::Closed),
        _ => Ok(None),
    }
}

/// Route `RequestResponse` frames to their waiting callers.
///
/// When the socket ends every outstanding request resolves to `Closed`.
async fn read_loop(mut reader: SplitStream<WsStream>, pending: Arc<Pending>) {
    while let Some(message) = reader.next().await {
        let frame = match message.map_err(|_| ObsError::Closed).and_then(parse_frame) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(ObsError::Closed) => break,
            Err(e) => {
                warn!(error = %e, "dropping unreadable obs frame");
                continue;
            }
        };

        match frame.op {
            OP_REQUEST_RESPONSE => {
                let response: RequestResponse = match serde_json::from_value(frame.d) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(error = %e, "invalid obs request response");
                        continue;
                    }
                };
                let Some((_, tx)) = pending.remove(&response.request_id) else {
                    debug!(request_id = %response.request_id, "response for unknown request");
                    continue;
                };
                let _ = tx.send(into_result(response));
            }
            OP_EVENT => trace!("ignoring obs event"),
            op => trace!(op, "ignoring obs frame"),
        }
    }

    warn!(pending = pending.len(), "obs connection closed");
    let ids: Vec<String> = pending.iter().map(|entry| entry.key().clone()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(ObsError::Closed));
        }
    }
}

fn into_result(response: RequestResponse) -> Result<Value> {
    if !response.request_status.result {
        return Err(ObsError::Request {
            request_type: response.request_type,
            code: response.request_status.code,
            comment: response.request_status.comment.unwrap_or_default(),
        });
    }
    Ok(response
        .response_data
        .unwrap_or_else(|| Value::Object(Default::default())))
}
