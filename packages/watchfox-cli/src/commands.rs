use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::Stream;
use obs_client::{ObsClient, ObsManager};
use tracing::info;
use watchfox::control::RecordingRequester;
use watchfox::recording::{self, ReplayFilter};
use watchfox::{
    source, Engine, ExecutionContext, HandlerRegistry, RunReport, ServerSentEvent, SourceError,
};

use crate::cli::{Commands, DispatchArgs};
use crate::config::{FileConfig, ObsConfig};

/// Run one parsed command against `registry`.
pub async fn execute(
    command: Commands,
    config: FileConfig,
    registry: HandlerRegistry,
) -> Result<()> {
    match command {
        Commands::Record {
            events_file,
            append,
        } => {
            record(&config, &events_file, append).await?;
        }
        Commands::Replay {
            events_file,
            allow,
            deny,
            sleep,
            dispatch: args,
        } => {
            let filter = ReplayFilter::new(allow, deny);
            replay(&config, &events_file, filter, sleep, &args, registry).await?;
        }
        Commands::Run { dispatch: args } => {
            run(&config, &args, registry).await?;
        }
    }
    Ok(())
}

/// Copy the live feed to `events_file`. Returns the number of events written.
pub async fn record(config: &FileConfig, events_file: &Path, append: bool) -> Result<u64> {
    println!("command record {}", events_file.display());

    let events = source::connect(config.sse_url()?).await?;
    let written = recording::record_events(events_file, append, events)
        .await
        .with_context(|| format!("Recording to {} stopped", events_file.display()))?;
    Ok(written)
}

/// Dispatch a recorded feed.
pub async fn replay(
    config: &FileConfig,
    events_file: &Path,
    filter: ReplayFilter,
    sleep: Duration,
    args: &DispatchArgs,
    registry: HandlerRegistry,
) -> Result<RunReport> {
    println!("command replay {}", events_file.display());

    let events = recording::replay(events_file, filter, sleep)
        .await
        .with_context(|| format!("Failed to open recording: {}", events_file.display()))?;
    dispatch(config, args, registry, events).await
}

/// Dispatch the live feed.
pub async fn run(
    config: &FileConfig,
    args: &DispatchArgs,
    registry: HandlerRegistry,
) -> Result<RunReport> {
    println!("command run");

    let events = source::connect(config.sse_url()?).await?;
    dispatch(config, args, registry, events).await
}

async fn dispatch<S>(
    config: &FileConfig,
    args: &DispatchArgs,
    registry: HandlerRegistry,
    events: S,
) -> Result<RunReport>
where
    S: Stream<Item = Result<ServerSentEvent, SourceError>>,
{
    let obs = obs_manager(&config.obs, args.mock_obs).await?;
    let context = ExecutionContext::new(obs, config.watchfox.clone());
    let engine = Engine::new(registry, context).with_mode(args.mode);

    let report = engine.run(events).await.context("Event processing aborted")?;
    Ok(report)
}

/// The OBS control surface, or a recording stand-in when `mock` is set.
pub async fn obs_manager(config: &ObsConfig, mock: bool) -> Result<ObsManager> {
    if mock {
        info!("using mock obs");
        let (obs, _) = RecordingRequester::manager();
        return Ok(obs);
    }

    info!("making obs client");
    let client = ObsClient::connect(config.options())
        .await
        .context("Failed to connect to OBS (is obs running?)")?;
    Ok(ObsManager::new(Arc::new(client)))
}
