//! Per-run execution context handed to every handler.

use std::sync::Arc;

use obs_client::ObsManager;
use serde_json::{Map, Value};

/// String-keyed handler configuration (the `[watchfox]` table of the config file).
pub type Config = Map<String, Value>;

/// The control-surface handle and configuration shared by every handler of a
/// run.
///
/// Built once before the run and never mutated afterwards. Cloning is cheap
/// and every clone sees the same data.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    obs: ObsManager,
    config: Config,
}

impl ExecutionContext {
    pub fn new(obs: ObsManager, config: Config) -> Self {
        Self {
            inner: Arc::new(ContextInner { obs, config }),
        }
    }

    /// The control surface.
    pub fn obs(&self) -> &ObsManager {
        &self.inner.obs
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Look up a dotted path such as `audio.dir` in the configuration.
    pub fn config_value(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.inner.config.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn config_str(&self, path: &str) -> Option<&str> {
        self.config_value(path).and_then(Value::as_str)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
