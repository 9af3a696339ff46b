//! Error types for the OBS client.

use std::time::Duration;

use thiserror::Error;

/// Result type for OBS client operations.
pub type Result<T> = std::result::Result<T, ObsError>;

/// OBS client errors.
#[derive(Debug, Error)]
pub enum ObsError {
    /// Could not open the WebSocket (OBS not running, wrong host/port)
    #[error("Connection error: could not reach {url}: {message}")]
    Connect { url: String, message: String },

    /// Authentication rejected or a password is required but missing
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Unexpected frame, op code, or response shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// OBS answered the request with a failure status
    #[error("Request {request_type} failed with code {code}: {comment}")]
    Request {
        request_type: String,
        code: i64,
        comment: String,
    },

    /// No response arrived within the configured timeout
    #[error("Request {request_type} timed out after {duration:?}")]
    Timeout {
        request_type: String,
        duration: Duration,
    },

    /// The connection closed while a request was in flight
    #[error("Connection closed")]
    Closed,
}
