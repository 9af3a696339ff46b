//! Dispatch engine - feeds an event source through schemas into handlers.
//!
//! ```text
//! source ─▶ resolve name ─▶ decode payload ─▶ handlers_for(kind) ─▶ invoke
//!              │ unknown        │ violation
//!              └─ log, skip     └─ log, skip
//! ```
//!
//! A run is bracketed by the `processing_start` and `processing_end`
//! lifecycle events. In [`ExecutionMode::Sequential`] every invocation is
//! awaited before the next one starts. In [`ExecutionMode::Concurrent`]
//! invocations are spawned in the same order and joined when the source is
//! exhausted; the run completes only after every spawned invocation, including
//! `processing_end` handlers, has finished.
//!
//! # Usage
//!
//! ```ignore
//! let engine = Engine::new(registry, ExecutionContext::new(obs, config))
//!     .with_mode(ExecutionMode::Sequential);
//!
//! let report = engine.run(watchfox::source::connect(&url).await?).await?;
//! info!(dispatched = report.dispatched, "feed finished");
//! ```
//!
//! # Failures
//!
//! Unknown events, payloads that fail their schema, and failing or panicking
//! handlers are logged at `error` and the run continues. Only a failure of the
//! source itself ends the run, as [`EngineError::Source`].

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use futures::{FutureExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::context::ExecutionContext;
use crate::error::{DecodeError, EngineError, SourceError};
use crate::event::{EventKind, ServerSentEvent};
use crate::handler::RegisteredHandler;
use crate::payload::Payload;
use crate::registry::HandlerRegistry;
use crate::schema::SchemaRegistry;

/// How long an aborted run waits for in-flight handlers by default.
pub const DEFAULT_ABORT_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// Modes and States
// =============================================================================

/// How handler invocations are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Each invocation finishes before the next begins.
    Sequential,
    /// Invocations are spawned in order; whatever is still running at the end
    /// of the run is joined.
    #[default]
    Concurrent,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str("sequential"),
            ExecutionMode::Concurrent => f.write_str("concurrent"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "concurrent" => Ok(ExecutionMode::Concurrent),
            other => Err(format!(
                "unknown execution mode `{}` (expected sequential or concurrent)",
                other
            )),
        }
    }
}

/// Lifecycle of a dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Events pulled from the source.
    pub received: u64,
    /// Events decoded and handed to handlers.
    pub dispatched: u64,
    /// Events skipped as unknown or malformed.
    pub skipped: u64,
    /// Handler invocations, lifecycle ones included.
    pub invocations: u64,
    /// Invocations that returned an error or panicked.
    pub failures: u64,
}

// =============================================================================
// Engine
// =============================================================================

/// Runs one event source through a fixed set of handlers.
///
/// Engines are single-use: the registry and context are fixed at
/// construction and a second call to [`run`](Engine::run) is rejected.
pub struct Engine {
    registry: HandlerRegistry,
    schemas: SchemaRegistry,
    context: ExecutionContext,
    mode: ExecutionMode,
    abort_grace: Duration,
    state: Mutex<RunState>,
}

impl Engine {
    pub fn new(registry: HandlerRegistry, context: ExecutionContext) -> Self {
        Self {
            registry,
            schemas: SchemaRegistry::standard(),
            context,
            mode: ExecutionMode::default(),
            abort_grace: DEFAULT_ABORT_GRACE,
            state: Mutex::new(RunState::NotStarted),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the standard minifox schemas.
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    /// Bound on the `processing_end` dispatch and handler join after a source failure.
    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Consume `source` end to end.
    pub async fn run<S>(&self, source: S) -> Result<RunReport, EngineError>
    where
        S: Stream<Item = Result<ServerSentEvent, SourceError>>,
    {
        self.begin()?;
        info!(mode = %self.mode, handlers = self.registry.len(), "dispatch run started");

        let mut dispatch = Dispatch::new(self);
        dispatch.fire(EventKind::ProcessingStart, None).await;

        futures::pin_mut!(source);
        while let Some(item) = source.next().await {
            let event = match item {
                Ok(event) => event,
                Err(err) => return Err(self.abort(dispatch, err).await),
            };
            dispatch.report.received += 1;

            let payload = match self.decode(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    match &err {
                        DecodeError::UnknownType { .. } => {
                            error!(event = %event.event, error = %err, "skipping unknown event")
                        }
                        DecodeError::SchemaViolation { .. } => {
                            error!(event = %event.event, error = %err, "skipping malformed event")
                        }
                    }
                    dispatch.report.skipped += 1;
                    continue;
                }
            };

            debug!(event = %payload.kind(), match_id = payload.match_id(), "dispatching event");
            dispatch.report.dispatched += 1;
            dispatch
                .fire(payload.kind(), Some(Arc::new(payload)))
                .await;
        }

        dispatch.fire(EventKind::ProcessingEnd, None).await;
        dispatch.join().await;
        self.set_state(RunState::Completed);

        let report = dispatch.report;
        info!(
            received = report.received,
            dispatched = report.dispatched,
            skipped = report.skipped,
            invocations = report.invocations,
            failures = report.failures,
            "dispatch run completed"
        );
        Ok(report)
    }

    fn begin(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != RunState::NotStarted {
            return Err(EngineError::AlreadyStarted {
                state: state.as_str(),
            });
        }
        *state = RunState::Running;
        Ok(())
    }

    fn set_state(&self, next: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Unknown names are rejected before the payload is even parsed.
    fn decode(&self, event: &ServerSentEvent) -> Result<Payload, DecodeError> {
        let kind = self.schemas.resolve(&event.event)?;
        let raw = event
            .json()
            .map_err(|e| DecodeError::schema_violation(kind, e))?;
        self.schemas.decode_kind(kind, &raw)
    }

    /// Best-effort close of a run whose source failed.
    ///
    /// `processing_end` is fired and launched handlers are awaited, but only
    /// for `abort_grace`; anything still running after that is cancelled.
    async fn abort(&self, mut dispatch: Dispatch<'_>, err: SourceError) -> EngineError {
        error!(error = %err, "event source failed, aborting dispatch run");
        self.set_state(RunState::Aborted);

        let deadline = Instant::now() + self.abort_grace;
        let closed = tokio::time::timeout_at(deadline, async {
            dispatch.fire(EventKind::ProcessingEnd, None).await;
            dispatch.join().await;
        })
        .await;

        if closed.is_err() {
            warn!(
                grace = ?self.abort_grace,
                outstanding = dispatch.tasks.len(),
                "cancelling handlers still running after source failure"
            );
            dispatch.tasks.abort_all();
        }

        let report = &dispatch.report;
        info!(
            received = report.received,
            dispatched = report.dispatched,
            invocations = report.invocations,
            failures = report.failures,
            "dispatch run aborted"
        );
        EngineError::Source(err)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("handlers", &self.registry)
            .field("abort_grace", &self.abort_grace)
            .finish()
    }
}

// =============================================================================
// Per-run Dispatch
// =============================================================================

/// Scheduling state of one run.
struct Dispatch<'a> {
    engine: &'a Engine,
    tasks: JoinSet<bool>,
    report: RunReport,
}

impl<'a> Dispatch<'a> {
    fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            tasks: JoinSet::new(),
            report: RunReport::default(),
        }
    }

    /// Invoke every handler of `kind` in registration order.
    async fn fire(&mut self, kind: EventKind, payload: Option<Arc<Payload>>) {
        for handler in self.engine.registry.handlers_for(kind) {
            self.report.invocations += 1;
            let invocation = invoke(
                handler.clone(),
                kind,
                self.engine.context.clone(),
                payload.clone(),
            );

            match self.engine.mode {
                ExecutionMode::Sequential => {
                    if !invocation.await {
                        self.report.failures += 1;
                    }
                }
                ExecutionMode::Concurrent => {
                    self.tasks.spawn(invocation);
                }
            }
        }
        self.reap();
    }

    /// Collect invocations that already finished, keeping the set bounded on
    /// long feeds.
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.settle(joined);
        }
    }

    /// Wait for every spawned invocation.
    async fn join(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.settle(joined);
        }
    }

    fn settle(&mut self, joined: Result<bool, JoinError>) {
        match joined {
            Ok(true) => {}
            Ok(false) => self.report.failures += 1,
            Err(e) => {
                error!(error = %e, "handler task did not complete");
                self.report.failures += 1;
            }
        }
    }
}

/// Run one handler, isolating errors and panics. Returns whether it succeeded.
async fn invoke(
    handler: RegisteredHandler,
    kind: EventKind,
    ctx: ExecutionContext,
    payload: Option<Arc<Payload>>,
) -> bool {
    debug!(handler = handler.name(), event = %kind, "invoking handler");

    let result = AssertUnwindSafe(handler.call(ctx, payload))
        .catch_unwind()
        .await;

    // Convert panic to error
    let result = match result {
        Ok(inner) => inner,
        Err(panic_info) => {
            let panic_msg = extract_panic_message(&panic_info);
            Err(anyhow!("handler panicked: {}", panic_msg))
        }
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            error!(handler = handler.name(), event = %kind, error = %e, "handler failed");
            false
        }
    }
}

fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RecordingRequester;
    use crate::payload::MatchEnd;
    use futures::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine(registry: HandlerRegistry) -> Engine {
        let (obs, _) = RecordingRequester::manager();
        Engine::new(registry, ExecutionContext::new(obs, Default::default()))
    }

    fn end(id: &str) -> Result<ServerSentEvent, SourceError> {
        Ok(ServerSentEvent::with_json(
            "match_end",
            &json!({"id": id, "result": "Draw"}),
        ))
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Sequential".parse::<ExecutionMode>().unwrap(), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Concurrent);
        assert!("parallel".parse::<ExecutionMode>().is_err());
    }

    #[tokio::test]
    async fn test_report_counts() {
        let mut registry = HandlerRegistry::new();
        registry
            .on::<MatchEnd, _, _>(|_ctx, _end| async { Ok(()) })
            .on::<MatchEnd, _, _>(|_ctx, _end| async { Err(anyhow!("overlay offline")) })
            .on_processing_end(|_ctx| async { Ok(()) });

        let events = vec![
            end("g1"),
            Ok(ServerSentEvent::new("match_resign", "{}")),
            Ok(ServerSentEvent::new("match_end", "not json")),
            end("g2"),
        ];

        let report = engine(registry).run(stream::iter(events)).await.unwrap();
        assert_eq!(
            report,
            RunReport {
                received: 4,
                dispatched: 2,
                skipped: 2,
                invocations: 5,
                failures: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_sequential_panic_is_isolated() {
        let after = Arc::new(AtomicUsize::new(0));
        let seen = after.clone();

        let mut registry = HandlerRegistry::new();
        registry
            .on::<MatchEnd, _, _>(|_ctx, end| async move {
                if end.id == "g1" {
                    panic!("boom");
                }
                Ok(())
            })
            .on::<MatchEnd, _, _>(move |_ctx, _end| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });

        let engine = engine(registry).with_mode(ExecutionMode::Sequential);
        let report = engine
            .run(stream::iter(vec![end("g1"), end("g2")]))
            .await
            .unwrap();

        assert_eq!(after.load(Ordering::SeqCst), 2);
        assert_eq!(report.failures, 1);
        assert_eq!(engine.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_engine_is_single_use() {
        let engine = engine(HandlerRegistry::new());
        engine
            .run(stream::iter(Vec::<Result<ServerSentEvent, SourceError>>::new()))
            .await
            .unwrap();

        let err = engine.run(stream::iter(vec![end("g1")])).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::AlreadyStarted { state: "completed" }
        ));
    }

    #[tokio::test]
    async fn test_finished_invocations_are_reaped_while_dispatching() {
        let mut registry = HandlerRegistry::new();
        registry.on::<MatchEnd, _, _>(|_ctx, end| async move {
            match end.id.as_str() {
                "odd" => Err(anyhow!("overlay offline")),
                _ => Ok(()),
            }
        });
        let engine = engine(registry);
        let mut dispatch = Dispatch::new(&engine);

        let mut largest = 0;
        for n in 0..1000 {
            let id = if n % 2 == 0 { "even" } else { "odd" };
            let payload = Payload::MatchEnd(MatchEnd {
                id: id.to_string(),
                result: "Draw".to_string(),
            });
            dispatch.fire(EventKind::MatchEnd, Some(Arc::new(payload))).await;
            largest = largest.max(dispatch.tasks.len());
            tokio::task::yield_now().await;
        }
        dispatch.join().await;

        assert!(largest <= 10, "{} invocations were pending at once", largest);
        assert_eq!(dispatch.report.invocations, 1000);
        assert_eq!(dispatch.report.failures, 500);
    }

    #[test]
    fn test_extract_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(extract_panic_message(&boxed), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(extract_panic_message(&boxed), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(extract_panic_message(&boxed), "unknown panic");
    }
}
