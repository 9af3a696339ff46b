//! `config.toml` plus environment overrides.
//!
//! ```toml
//! [minifoxwq]
//! sse_url = "http://localhost:8000/events"
//!
//! [obs]
//! host = "localhost"
//! port = 4455
//! password = "secret"
//!
//! [watchfox]          # handed to every handler as-is
//! config-key = "config-value"
//! ```
//!
//! `MINIFOX_SSE_URL`, `OBS_HOST`, `OBS_PORT`, and `OBS_PASSWORD` win over the
//! file. A `.env` file is loaded first when present.

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use obs_client::ObsOptions;
use serde::Deserialize;
use watchfox::Config;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub minifoxwq: MinifoxConfig,
    pub obs: ObsConfig,
    /// Handler configuration, passed through untouched.
    pub watchfox: Config,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MinifoxConfig {
    pub sse_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: None,
            timeout_secs: 10,
        }
    }
}

impl ObsConfig {
    pub fn options(&self) -> ObsOptions {
        ObsOptions {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl FileConfig {
    /// Read `path`, then apply `.env` and process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let _ = dotenv();

        let mut config = Self::parse_file(path)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("MINIFOX_SSE_URL") {
            self.minifoxwq.sse_url = Some(url);
        }
        if let Some(host) = lookup("OBS_HOST") {
            self.obs.host = host;
        }
        if let Some(port) = lookup("OBS_PORT") {
            self.obs.port = port.parse().context("OBS_PORT must be a valid port number")?;
        }
        if let Some(password) = lookup("OBS_PASSWORD") {
            self.obs.password = Some(password);
        }
        Ok(())
    }

    /// The minifox feed URL; `record` and `run` cannot start without it.
    pub fn sse_url(&self) -> Result<&str> {
        self.minifoxwq
            .sse_url
            .as_deref()
            .context("minifoxwq.sse_url must be set (or MINIFOX_SSE_URL)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_full_file() {
        let file = write_config(
            r#"
            [minifoxwq]
            sse_url = "http://localhost:8000/events"

            [obs]
            host = "studio"
            port = 4460
            password = "hunter2"

            [watchfox]
            config-key = "config-value"

            [watchfox.audio]
            dir = "audio"
            "#,
        );

        let config = FileConfig::parse_file(file.path()).unwrap();
        assert_eq!(config.sse_url().unwrap(), "http://localhost:8000/events");
        assert_eq!(config.obs.host, "studio");
        assert_eq!(config.obs.port, 4460);
        assert_eq!(config.obs.password.as_deref(), Some("hunter2"));
        assert_eq!(config.obs.timeout_secs, 10);
        assert_eq!(config.watchfox["config-key"], json!("config-value"));
        assert_eq!(config.watchfox["audio"]["dir"], json!("audio"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = FileConfig::parse_file(file.path()).unwrap();

        assert_eq!(config.obs.options().url(), "ws://localhost:4455");
        assert!(config.watchfox.is_empty());
        assert!(config.sse_url().is_err());
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = FileConfig::parse_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.toml"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[obs]\nhost = \"studio\"\n");
        let mut config = FileConfig::parse_file(file.path()).unwrap();

        let vars: HashMap<&str, &str> = [
            ("MINIFOX_SSE_URL", "http://feed/events"),
            ("OBS_PORT", "4999"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.sse_url().unwrap(), "http://feed/events");
        assert_eq!(config.obs.host, "studio");
        assert_eq!(config.obs.port, 4999);
    }

    #[test]
    fn test_invalid_port_override_is_rejected() {
        let mut config = FileConfig::default();
        let result = config.apply_overrides(|key| (key == "OBS_PORT").then(|| "nope".to_string()));
        assert!(result.is_err());
    }
}
