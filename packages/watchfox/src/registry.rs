//! Handler registry: event kind -> ordered handlers.

use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;

use crate::context::ExecutionContext;
use crate::event::EventKind;
use crate::handler::{FnHandler, FnLifecycle, Handler, LifecycleHandler, RegisteredHandler};
use crate::payload::EventPayload;

/// Handlers per event kind, kept in registration order.
///
/// Registration is additive and happens before a run starts; the engine takes
/// the registry by value so it cannot change during a run.
///
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry
///     .on_processing_start(|ctx| async move {
///         ctx.obs().scene("Game").program().await?;
///         Ok(())
///     })
///     .on::<MatchEnd, _, _>(|ctx, end| async move {
///         ctx.obs().label("result").set_text(&end.result).await?;
///         Ok(())
///     });
/// ```
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `P`'s event kind, named after its type.
    pub fn register<P: EventPayload, H: Handler<P>>(&mut self, handler: H) -> &mut Self {
        self.register_named::<P, H>(short_type_name::<H>(), handler)
    }

    pub fn register_named<P: EventPayload, H: Handler<P>>(
        &mut self,
        name: &str,
        handler: H,
    ) -> &mut Self {
        self.push(RegisteredHandler::typed::<P, H>(name, handler))
    }

    /// Register an async closure for `P`'s event kind.
    pub fn on<P, F, Fut>(&mut self, f: F) -> &mut Self
    where
        P: EventPayload,
        F: Fn(ExecutionContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = self.default_name(P::KIND);
        self.register_named::<P, _>(&name, FnHandler(f))
    }

    /// Register a handler for a lifecycle kind.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is a feed event kind. That is a programming error in
    /// registration code, caught before any run starts.
    pub fn register_lifecycle<H: LifecycleHandler>(
        &mut self,
        kind: EventKind,
        name: &str,
        handler: H,
    ) -> &mut Self {
        assert!(
            kind.is_lifecycle(),
            "{} is not a lifecycle event; register a Handler for its payload",
            kind
        );
        self.push(RegisteredHandler::lifecycle(name, kind, handler))
    }

    pub fn on_processing_start<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = self.default_name(EventKind::ProcessingStart);
        self.register_lifecycle(EventKind::ProcessingStart, &name, FnLifecycle(f))
    }

    pub fn on_processing_end<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = self.default_name(EventKind::ProcessingEnd);
        self.register_lifecycle(EventKind::ProcessingEnd, &name, FnLifecycle(f))
    }

    /// Handlers for `kind` in registration order; empty when none are registered.
    pub fn handlers_for(&self, kind: EventKind) -> &[RegisteredHandler] {
        self.handlers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, handler: RegisteredHandler) -> &mut Self {
        self.handlers.entry(handler.kind()).or_default().push(handler);
        self
    }

    fn default_name(&self, kind: EventKind) -> String {
        format!("{}#{}", kind, self.handlers_for(kind).len())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        for kind in kinds {
            let names: Vec<&str> = self.handlers_for(*kind).iter().map(|h| h.name()).collect();
            map.entry(&kind.as_str(), &names);
        }
        map.finish()
    }
}

/// `watchfox_cli::handlers::ScoreboardHandler` -> `ScoreboardHandler`.
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let start = base.rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}
