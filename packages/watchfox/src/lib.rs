//! Watchfox - drive an OBS production from a minifox match feed.
//!
//! minifox streams Go match events (start, clock updates, moves, chat, end)
//! as server-sent events. Watchfox decodes each event into a typed payload
//! and hands it to every handler registered for that event, together with an
//! [`ExecutionContext`] carrying the OBS control surface and the handler
//! configuration.
//!
//! ```text
//! minifox ─SSE─▶ Engine ─decode─▶ SchemaRegistry
//!                  │
//!                  └─handlers_for─▶ HandlerRegistry ─▶ handler(ctx, payload) ─▶ OBS
//! ```
//!
//! # Example
//!
//! ```ignore
//! use watchfox::{Engine, ExecutionContext, HandlerRegistry, MatchMove};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.on::<MatchMove, _, _>(|ctx, mv| async move {
//!     ctx.obs().label("move-number").set_text(&mv.move_number.to_string()).await?;
//!     Ok(())
//! });
//!
//! let engine = Engine::new(registry, ExecutionContext::new(obs, config));
//! engine.run(watchfox::source::connect(&sse_url).await?).await?;
//! ```
//!
//! Recorded feeds replay through the same engine; see [`recording`].

pub mod audio;
pub mod context;
pub mod control;
pub mod engine;
pub mod error;
pub mod event;
pub mod go;
pub mod handler;
pub mod payload;
pub mod recording;
pub mod registry;
pub mod schema;
pub mod source;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::{Config, ExecutionContext};
pub use engine::{Engine, ExecutionMode, RunReport, RunState};
pub use error::{DecodeError, EngineError, ResultParseError, SourceError};
pub use event::{EventKind, ServerSentEvent};
pub use handler::{FnHandler, FnLifecycle, Handler, LifecycleHandler, RegisteredHandler};
pub use payload::{
    Clock, EventPayload, MatchChat, MatchEnd, MatchMove, MatchStart, MatchTime, Move, Payload,
    Player, Settings, TimeControl, Turn,
};
pub use registry::HandlerRegistry;
pub use schema::SchemaRegistry;

// Re-export for handler implementations
pub use async_trait::async_trait;
pub use obs_client::{ObsManager, Requester};
