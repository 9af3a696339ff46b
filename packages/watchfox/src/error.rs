//! Error types for decoding, event sources, and dispatch runs.
//!
//! Only [`SourceError`] is fatal to a run. Decode failures and handler
//! failures are logged by the engine and the run continues.

use thiserror::Error;

use crate::event::EventKind;

/// Why an event's payload could not be turned into a typed payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No schema is registered under this event name.
    #[error("unknown event type `{name}`")]
    UnknownType {
        /// The name as received from the source.
        name: String,
    },

    /// The event type is known but its payload does not match the schema.
    #[error("invalid {kind} payload: {message}")]
    SchemaViolation {
        kind: EventKind,
        /// What was wrong (missing field, wrong type, out of range).
        message: String,
    },
}

impl DecodeError {
    pub fn schema_violation(kind: EventKind, err: impl std::fmt::Display) -> Self {
        Self::SchemaViolation {
            kind,
            message: err.to_string(),
        }
    }
}

/// Failures of the event source itself. Any of these aborts a run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not connect to {url} (is minifox running?): {message}")]
    Connect { url: String, message: String },

    #[error("event stream at {url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("event stream interrupted: {0}")]
    Network(String),

    #[error("malformed event stream: {0}")]
    Framing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A recording line that is not a valid event record.
    #[error("corrupt recording at line {line}: {message}")]
    Corrupt { line: usize, message: String },
}

/// Errors reported to the caller of [`Engine::run`](crate::Engine::run).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("event source failed: {0}")]
    Source(#[from] SourceError),

    /// Engines are single-use.
    #[error("dispatch run already {state}")]
    AlreadyStarted { state: &'static str },
}

/// A match result string that is not one of the recognised forms.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised match result `{0}`")]
pub struct ResultParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_mentions_minifox() {
        let err = SourceError::Connect {
            url: "http://localhost:8080/events".into(),
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("is minifox running?"));
    }

    #[test]
    fn test_source_error_converts_into_engine_error() {
        let err: EngineError = SourceError::Network("reset by peer".into()).into();
        assert!(matches!(err, EngineError::Source(SourceError::Network(_))));
    }
}
