//! OBS WebSocket v5 request client
//!
//! A small client for driving a running OBS instance: scenes, media inputs,
//! filters, text labels, scene items, and hotkeys. It only issues requests;
//! OBS events are ignored.
//!
//! # Example
//!
//! ```rust,ignore
//! use obs_client::{ObsClient, ObsManager, ObsOptions};
//! use std::sync::Arc;
//!
//! let client = ObsClient::connect(ObsOptions::default()).await?;
//! let obs = ObsManager::new(Arc::new(client));
//!
//! obs.scene("Game").program().await?;
//! obs.media("intro").restart().await?;
//! obs.label("black-name").set_text("Shin Jinseo").await?;
//! ```
//!
//! # Raw Requests
//!
//! Anything the managers don't cover goes through [`Requester::send`]:
//!
//! ```rust,ignore
//! let version = obs.requester().send("GetVersion", None).await?;
//! ```

pub mod client;
pub mod error;
pub mod manager;
pub mod protocol;

pub use client::{ObsClient, ObsOptions};
pub use error::{ObsError, Result};
pub use manager::{
    FilterManager, HotkeyManager, KeyModifiers, LabelManager, MediaAction, MediaManager,
    ObsManager, SceneItemManager, SceneManager, SourceManager,
};

use async_trait::async_trait;
use serde_json::Value;

/// Anything that can carry an OBS request and return its response data.
///
/// [`ObsClient`] is the networked implementation; test doubles implement
/// this to stand in for OBS.
#[async_trait]
pub trait Requester: Send + Sync + 'static {
    /// Send `request_type` with optional `request_data`.
    ///
    /// Returns the response data object (`{}` when OBS sends none).
    async fn send(&self, request_type: &str, request_data: Option<Value>) -> Result<Value>;
}
