use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use watchfox::{EventKind, ExecutionMode};

/// Recording file used when none is given.
pub const DEFAULT_EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Parser)]
#[command(name = "watchfox")]
#[command(about = "Drive an OBS production from minifox match events")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Install the log subscriber
    #[arg(long, global = true, overrides_with = "no_log")]
    pub log: bool,

    /// Do not install the log subscriber (default)
    #[arg(long, global = true, overrides_with = "log")]
    pub no_log: bool,

    /// Logging configuration file
    #[arg(long, global = true, default_value = "logging.toml")]
    pub log_config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record events from minifox
    Record {
        #[arg(default_value = DEFAULT_EVENTS_FILE)]
        events_file: PathBuf,

        /// Append to the file instead of replacing it
        #[arg(long)]
        append: bool,
    },

    /// Process pre-recorded events
    Replay {
        #[arg(default_value = DEFAULT_EVENTS_FILE)]
        events_file: PathBuf,

        /// Only process these events
        #[arg(long, value_parser = parse_event_name)]
        allow: Vec<String>,

        /// Do not process these events
        #[arg(long, value_parser = parse_event_name)]
        deny: Vec<String>,

        /// Seconds between events
        #[arg(long, default_value = "1.0", value_parser = parse_sleep)]
        sleep: Duration,

        #[command(flatten)]
        dispatch: DispatchArgs,
    },

    /// Process live events coming from minifox
    Run {
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct DispatchArgs {
    /// Do not connect to an OBS instance
    #[arg(long)]
    pub mock_obs: bool,

    /// How handler invocations are scheduled
    #[arg(long, default_value_t = ExecutionMode::Concurrent)]
    pub mode: ExecutionMode,
}

fn parse_event_name(name: &str) -> Result<String, String> {
    match EventKind::domain(name) {
        Some(kind) => Ok(kind.as_str().to_string()),
        None => Err(format!(
            "unknown event `{}` (expected one of: {})",
            name,
            EventKind::domain_names().join(", ")
        )),
    }
}

fn parse_sleep(secs: &str) -> Result<Duration, String> {
    let secs: f64 = secs.parse().map_err(|e| format!("{}", e))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("`{}` is not a valid delay", secs))
}

impl Cli {
    pub fn logging_enabled(&self) -> bool {
        self.log && !self.no_log
    }
}
