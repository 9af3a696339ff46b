//! Testing utilities for handler registrations.
//!
//! Only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! watchfox = { workspace = true, features = ["testing"] }
//! ```
//!
//! ```ignore
//! let log = InvocationLog::new();
//! let mut registry = HandlerRegistry::new();
//! log.register_all(&mut registry);
//!
//! engine.run(events).await?;
//! assert_eq!(log.entries(), vec!["processing_start", "match_end:g1", "processing_end"]);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use crate::context::ExecutionContext;
use crate::event::EventKind;
use crate::handler::FnLifecycle;
use crate::payload::{EventPayload, MatchChat, MatchEnd, MatchMove, MatchStart, MatchTime};
use crate::registry::HandlerRegistry;

/// Shared, ordered record of handler invocations.
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log `<kind>:<match id>` for `P`.
    pub fn register<P: EventPayload>(&self, registry: &mut HandlerRegistry) {
        let log = self.clone();
        registry.on::<P, _, _>(move |_ctx: ExecutionContext, payload: P| {
            let log = log.clone();
            async move {
                let payload = payload.into_payload();
                log.push(format!("{}:{}", payload.kind(), payload.match_id()));
                Ok(())
            }
        });
    }

    /// Log the kind name of a lifecycle event.
    pub fn register_lifecycle(&self, registry: &mut HandlerRegistry, kind: EventKind) {
        let log = self.clone();
        let record = move |_ctx: ExecutionContext| {
            let log = log.clone();
            async move {
                log.push(kind.as_str());
                Ok(())
            }
        };
        match kind {
            EventKind::ProcessingStart => registry.on_processing_start(record),
            EventKind::ProcessingEnd => registry.on_processing_end(record),
            other => registry.register_lifecycle(other, other.as_str(), FnLifecycle(record)),
        };
    }

    /// Log every event kind, lifecycle included.
    pub fn register_all(&self, registry: &mut HandlerRegistry) {
        self.register_lifecycle(registry, EventKind::ProcessingStart);
        self.register::<MatchStart>(registry);
        self.register::<MatchTime>(registry);
        self.register::<MatchMove>(registry);
        self.register::<MatchChat>(registry);
        self.register::<MatchEnd>(registry);
        self.register_lifecycle(registry, EventKind::ProcessingEnd);
    }
}
