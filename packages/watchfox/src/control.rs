//! Control-surface implementations that do not need a running OBS.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use obs_client::{ObsManager, Requester};
use serde_json::{json, Value};
use tracing::info;

/// One request captured by [`RecordingRequester`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub request_type: String,
    pub request_data: Option<Value>,
}

/// A [`Requester`] that records every request instead of sending it.
///
/// Answers with a canned response when one is set for the request type and
/// with `{}` otherwise. Backs `--mock-obs` and handler tests.
#[derive(Debug, Default)]
pub struct RecordingRequester {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<HashMap<String, Value>>,
}

impl RecordingRequester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `request_type` request with `response`.
    pub fn respond(&self, request_type: impl Into<String>, response: Value) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(request_type.into(), response);
        }
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_types(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.request_type)
            .collect()
    }

    /// Wrap a fresh recorder in a manager, keeping a handle for inspection.
    pub fn manager() -> (ObsManager, Arc<RecordingRequester>) {
        let requester = Arc::new(Self::new());
        (ObsManager::new(requester.clone()), requester)
    }
}

#[async_trait]
impl Requester for RecordingRequester {
    async fn send(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> obs_client::Result<Value> {
        info!(request_type, data = ?request_data, "mock obs request");
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                request_type: request_type.to_string(),
                request_data,
            });
        }
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(request_type).cloned());
        Ok(response.unwrap_or_else(|| json!({})))
    }
}
