//! Handler traits and their type-erased form.
//!
//! Handlers are written against a concrete payload type and erased into a
//! [`RegisteredHandler`] at registration time, so the registry can hold
//! handlers for every event kind side by side.
//!
//! ```ignore
//! use watchfox::{ExecutionContext, Handler, MatchEnd};
//!
//! struct ShowResult;
//!
//! #[async_trait]
//! impl Handler<MatchEnd> for ShowResult {
//!     async fn handle(&self, ctx: ExecutionContext, payload: &MatchEnd) -> Result<()> {
//!         ctx.obs().label("result").set_text(&payload.result).await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::ExecutionContext;
use crate::event::EventKind;
use crate::payload::{EventPayload, Payload};

/// Reacts to one kind of feed event.
///
/// Errors are logged by the engine and never stop the run.
#[async_trait]
pub trait Handler<P: EventPayload>: Send + Sync + 'static {
    async fn handle(&self, ctx: ExecutionContext, payload: &P) -> Result<()>;
}

/// Reacts to `processing_start` or `processing_end`.
#[async_trait]
pub trait LifecycleHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: ExecutionContext) -> Result<()>;
}

pub(crate) type HandlerFuture = BoxFuture<'static, Result<()>>;

trait ErasedHandler: Send + Sync {
    fn invoke(&self, ctx: ExecutionContext, payload: Option<Arc<Payload>>) -> HandlerFuture;
}

struct TypedHandler<P, H> {
    handler: Arc<H>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: EventPayload, H: Handler<P>> ErasedHandler for TypedHandler<P, H> {
    fn invoke(&self, ctx: ExecutionContext, payload: Option<Arc<Payload>>) -> HandlerFuture {
        let handler = self.handler.clone();
        async move {
            let payload = payload
                .as_deref()
                .and_then(P::from_payload)
                .ok_or_else(|| anyhow!("handler for {} received a mismatched payload", P::KIND))?;
            handler.handle(ctx, payload).await
        }
        .boxed()
    }
}

struct ErasedLifecycle<H> {
    handler: Arc<H>,
}

impl<H: LifecycleHandler> ErasedHandler for ErasedLifecycle<H> {
    fn invoke(&self, ctx: ExecutionContext, _payload: Option<Arc<Payload>>) -> HandlerFuture {
        let handler = self.handler.clone();
        async move { handler.handle(ctx).await }.boxed()
    }
}

/// Adapts an async closure taking an owned payload into a [`Handler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<P, F, Fut> Handler<P> for FnHandler<F>
where
    P: EventPayload,
    F: Fn(ExecutionContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: ExecutionContext, payload: &P) -> Result<()> {
        (self.0)(ctx, payload.clone()).await
    }
}

/// Adapts an async closure into a [`LifecycleHandler`].
pub struct FnLifecycle<F>(pub F);

#[async_trait]
impl<F, Fut> LifecycleHandler for FnLifecycle<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: ExecutionContext) -> Result<()> {
        (self.0)(ctx).await
    }
}

/// A handler bound to one event kind, ready to be invoked by the engine.
#[derive(Clone)]
pub struct RegisteredHandler {
    name: Arc<str>,
    kind: EventKind,
    invoke: Arc<dyn ErasedHandler>,
}

impl RegisteredHandler {
    pub(crate) fn typed<P: EventPayload, H: Handler<P>>(name: &str, handler: H) -> Self {
        Self {
            name: name.into(),
            kind: P::KIND,
            invoke: Arc::new(TypedHandler::<P, H> {
                handler: Arc::new(handler),
                _payload: PhantomData,
            }),
        }
    }

    pub(crate) fn lifecycle<H: LifecycleHandler>(name: &str, kind: EventKind, handler: H) -> Self {
        Self {
            name: name.into(),
            kind,
            invoke: Arc::new(ErasedLifecycle {
                handler: Arc::new(handler),
            }),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub(crate) fn call(&self, ctx: ExecutionContext, payload: Option<Arc<Payload>>) -> HandlerFuture {
        self.invoke.invoke(ctx, payload)
    }
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
