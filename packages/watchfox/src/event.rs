//! Event names and the raw server-sent event record.
//!
//! minifox publishes a closed set of match events. Two more kinds,
//! `processing_start` and `processing_end`, never arrive from the feed: the
//! engine synthesizes them at the boundaries of a dispatch run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every kind of event a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    ProcessingStart,
    ProcessingEnd,
    MatchStart,
    MatchTime,
    MatchMove,
    MatchChat,
    MatchEnd,
}

impl EventKind {
    /// The five feed events, in the order minifox documents them.
    pub const DOMAIN: [EventKind; 5] = [
        EventKind::MatchStart,
        EventKind::MatchTime,
        EventKind::MatchMove,
        EventKind::MatchChat,
        EventKind::MatchEnd,
    ];

    pub const LIFECYCLE: [EventKind; 2] = [EventKind::ProcessingStart, EventKind::ProcessingEnd];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProcessingStart => "processing_start",
            EventKind::ProcessingEnd => "processing_end",
            EventKind::MatchStart => "match_start",
            EventKind::MatchTime => "match_time",
            EventKind::MatchMove => "match_move",
            EventKind::MatchChat => "match_chat",
            EventKind::MatchEnd => "match_end",
        }
    }

    /// Lifecycle kinds carry no payload.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, EventKind::ProcessingStart | EventKind::ProcessingEnd)
    }

    /// Resolve a feed event name. Lifecycle names are not feed events.
    pub fn domain(name: &str) -> Option<EventKind> {
        name.parse().ok().filter(|kind: &EventKind| !kind.is_lifecycle())
    }

    /// Names of the feed events, for CLI choices.
    pub fn domain_names() -> Vec<&'static str> {
        Self::DOMAIN.iter().map(EventKind::as_str).collect()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing_start" => Ok(EventKind::ProcessingStart),
            "processing_end" => Ok(EventKind::ProcessingEnd),
            "match_start" => Ok(EventKind::MatchStart),
            "match_time" => Ok(EventKind::MatchTime),
            "match_move" => Ok(EventKind::MatchMove),
            "match_chat" => Ok(EventKind::MatchChat),
            "match_end" => Ok(EventKind::MatchEnd),
            other => Err(format!("unknown event `{}`", other)),
        }
    }
}

/// One event as delivered by the feed: a name and an undecoded JSON body.
///
/// This is also the unit written to and read from recordings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSentEvent {
    pub event: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl ServerSentEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Build an event from a JSON value, as a test or replay fixture.
    pub fn with_json(event: impl Into<String>, data: &serde_json::Value) -> Self {
        Self::new(event, data.to_string())
    }

    /// Parse the data field as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_for_every_kind() {
        for kind in EventKind::DOMAIN.iter().chain(EventKind::LIFECYCLE.iter()) {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_lifecycle_names_are_not_domain_events() {
        assert_eq!(EventKind::domain("match_move"), Some(EventKind::MatchMove));
        assert_eq!(EventKind::domain("processing_start"), None);
        assert_eq!(EventKind::domain("match_resign"), None);
    }

    #[test]
    fn test_recorded_form_omits_empty_fields() {
        let event = ServerSentEvent::new("match_end", r#"{"id":"g1","result":"Draw"}"#);
        let line = serde_json::to_string(&event).unwrap();
        assert_eq!(
            line,
            r#"{"event":"match_end","data":"{\"id\":\"g1\",\"result\":\"Draw\"}"}"#
        );
    }
}
