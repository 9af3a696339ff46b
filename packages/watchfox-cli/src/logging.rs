use std::env;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the logging file set one.
pub const DEFAULT_FILTER: &str = "info,watchfox=debug,watchfox_cli=debug";

/// Contents of `logging.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"warn,watchfox::engine=debug"`.
    pub filter: Option<String>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Read the logging file. A missing file is reported and skipped.
pub fn load_logging_config(path: &Path) -> Result<Option<LoggingConfig>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            println!("logging file `{}` not found.  skipping.", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read logging file: {}", path.display()))
        }
    };

    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse logging file: {}", path.display()))?;
    Ok(Some(config))
}

/// `RUST_LOG` wins, then the file, then [`DEFAULT_FILTER`].
pub fn resolve_filter(rust_log: Option<String>, config: &LoggingConfig) -> String {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .or_else(|| config.filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber. Nothing is logged unless `enabled`.
pub fn init(enabled: bool, path: &Path) -> Result<()> {
    if !enabled {
        return Ok(());
    }

    let config = load_logging_config(path)?.unwrap_or_default();
    let directives = resolve_filter(env::var("RUST_LOG").ok(), &config);
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter: {}", directives))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true)))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}
