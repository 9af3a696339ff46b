//! Payload schema registry: event name -> decoding contract.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::DecodeError;
use crate::event::EventKind;
use crate::payload::{EventPayload, MatchChat, MatchEnd, MatchMove, MatchStart, MatchTime, Payload};

type DecodeFn = fn(&Value) -> Result<Payload, serde_json::Error>;

fn decode_as<P: EventPayload>(raw: &Value) -> Result<Payload, serde_json::Error> {
    P::deserialize(raw).map(EventPayload::into_payload)
}

/// Maps each feed event kind to the typed payload it decodes into.
///
/// Lifecycle kinds never have a schema: they carry no payload.
#[derive(Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<EventKind, DecodeFn>,
}

impl SchemaRegistry {
    /// An empty registry. Every event is an unknown type until registered.
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// The five minifox match events.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register::<MatchStart>();
        registry.register::<MatchTime>();
        registry.register::<MatchMove>();
        registry.register::<MatchChat>();
        registry.register::<MatchEnd>();
        registry
    }

    /// Register the schema of `P` under `P::KIND`, replacing any previous one.
    pub fn register<P: EventPayload>(&mut self) -> &mut Self {
        self.schemas.insert(P::KIND, decode_as::<P>);
        self
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.schemas.contains_key(&kind)
    }

    /// Resolve a wire name to a kind with a registered schema.
    pub fn resolve(&self, name: &str) -> Result<EventKind, DecodeError> {
        EventKind::domain(name)
            .filter(|kind| self.contains(*kind))
            .ok_or_else(|| DecodeError::UnknownType {
                name: name.to_string(),
            })
    }

    /// Decode a raw payload received under `name`.
    pub fn decode(&self, name: &str, raw: &Value) -> Result<Payload, DecodeError> {
        let kind = self.resolve(name)?;
        self.decode_kind(kind, raw)
    }

    pub fn decode_kind(&self, kind: EventKind, raw: &Value) -> Result<Payload, DecodeError> {
        let decode = self
            .schemas
            .get(&kind)
            .ok_or_else(|| DecodeError::UnknownType {
                name: kind.to_string(),
            })?;
        decode(raw).map_err(|e| DecodeError::schema_violation(kind, e))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.schemas.keys().collect();
        kinds.sort();
        f.debug_struct("SchemaRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Move;
    use serde_json::json;

    fn start_json() -> Value {
        json!({
            "id": "g1",
            "black": {"avatar": "", "country": "KR", "nick": "shin", "rank": "9p"},
            "white": {"avatar": "", "country": "CN", "nick": "ke", "rank": "9p"},
            "settings": {"board_size": 19, "chinese_rules": true, "handicap": 0, "komi": 7},
            "time_control": {"byoyomi_periods": 5, "byoyomi_time": 30, "main_time": 600},
        })
    }

    #[test]
    fn test_decodes_nested_records() {
        let payload = SchemaRegistry::standard()
            .decode("match_start", &start_json())
            .unwrap();

        let Payload::MatchStart(start) = payload else {
            panic!("expected match start");
        };
        assert_eq!(start.black.nick, "shin");
        assert_eq!(start.settings.komi, 7.0);
        assert_eq!(start.time_control.main_time, 600);
    }

    #[test]
    fn test_pass_move_is_not_a_violation() {
        let payload = SchemaRegistry::standard()
            .decode(
                "match_move",
                &json!({"id": "g1", "move": [-1, -1], "move_number": 40, "turn": "W"}),
            )
            .unwrap();

        let Payload::MatchMove(mv) = payload else {
            panic!("expected match move");
        };
        assert_eq!(mv.mv, Move::Pass);
    }

    #[test]
    fn test_off_board_move_is_a_violation() {
        let err = SchemaRegistry::standard()
            .decode(
                "match_move",
                &json!({"id": "g1", "move": [19, 4], "move_number": 1, "turn": "B"}),
            )
            .unwrap_err();

        assert!(
            matches!(err, DecodeError::SchemaViolation { kind: EventKind::MatchMove, .. }),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_chat_without_message_is_a_violation() {
        let err = SchemaRegistry::standard()
            .decode(
                "match_chat",
                &json!({"id": "g1", "country": "JP", "nick": "iyama", "rank": "9p"}),
            )
            .unwrap_err();

        match err {
            DecodeError::SchemaViolation { kind, message } => {
                assert_eq!(kind, EventKind::MatchChat);
                assert!(message.contains("message"), "{}", message);
            }
            other => panic!("expected schema violation, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_lifecycle_names_are_unknown_types() {
        let registry = SchemaRegistry::standard();
        for name in ["match_resign", "processing_start", ""] {
            assert!(matches!(
                registry.decode(name, &json!({})),
                Err(DecodeError::UnknownType { .. })
            ));
        }
    }

    #[test]
    fn test_empty_registry_knows_nothing() {
        let registry = SchemaRegistry::new();
        assert!(!registry.contains(EventKind::MatchEnd));
        assert!(matches!(
            registry.decode("match_end", &json!({"id": "g1", "result": "Draw"})),
            Err(DecodeError::UnknownType { .. })
        ));
    }
}
