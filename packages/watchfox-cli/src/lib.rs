//! Command-line front end for watchfox.
//!
//! The `watchfox` binary registers the stock handlers and calls
//! [`run_cli`]. Downstream binaries register their own handlers instead and
//! get the same `record`/`replay`/`run` commands:
//!
//! ```ignore
//! use watchfox::{HandlerRegistry, MatchMove};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = HandlerRegistry::new();
//!     registry.on::<MatchMove, _, _>(|ctx, mv| async move {
//!         ctx.obs().label("move").set_text(&mv.move_number.to_string()).await?;
//!         Ok(())
//!     });
//!     watchfox_cli::run_cli(registry).await
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod handlers;
pub mod logging;

use anyhow::Result;
use clap::Parser;
use watchfox::HandlerRegistry;

pub use cli::{Cli, Commands, DispatchArgs};
pub use config::FileConfig;

/// Parse the process arguments and run the chosen command.
pub async fn run_cli(registry: HandlerRegistry) -> Result<()> {
    run_with(Cli::parse(), registry).await
}

/// Run an already-parsed command line.
pub async fn run_with(cli: Cli, registry: HandlerRegistry) -> Result<()> {
    let config = FileConfig::load(&cli.config)?;
    logging::init(cli.logging_enabled(), &cli.log_config)?;

    commands::execute(cli.command, config, registry).await
}
