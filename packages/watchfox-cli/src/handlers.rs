//! Handlers the `watchfox` binary registers out of the box.
//!
//! Each one reads its settings from the `[watchfox]` table at invocation
//! time and does nothing when its section is absent:
//!
//! ```toml
//! [watchfox.labels]
//! black = "black-name"
//! white = "white-name"
//! moves = "move-number"
//! result = "result"
//!
//! [watchfox.audio]
//! dir = "audio"
//! system = "fox"
//! player = "mpv --no-video --really-quiet"
//! ```

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use watchfox::audio::{AudioQueue, PlayerCommand};
use watchfox::go::{announce_move, parse_result, Color, CoordinateSystem};
use watchfox::{
    async_trait, Clock, EventPayload, ExecutionContext, Handler, HandlerRegistry, MatchChat,
    MatchEnd, MatchMove, MatchStart, MatchTime, Payload, Player,
};

/// Register every stock handler.
///
/// Returns the move audio handle; call [`MoveAudio::finish`] once the engine
/// has returned so queued announcements get played.
pub fn register_stock(registry: &mut HandlerRegistry) -> MoveAudio {
    registry
        .register_named::<MatchStart, _>("log", LogEvents)
        .register_named::<MatchTime, _>("log", LogEvents)
        .register_named::<MatchMove, _>("log", LogEvents)
        .register_named::<MatchChat, _>("log", LogEvents)
        .register_named::<MatchEnd, _>("log", LogEvents);

    registry
        .register_named::<MatchStart, _>("scoreboard", Scoreboard)
        .register_named::<MatchMove, _>("scoreboard", Scoreboard)
        .register_named::<MatchEnd, _>("scoreboard", Scoreboard);

    let audio = MoveAudio::default();
    registry.register_named::<MatchMove, _>("move-audio", audio.clone());
    audio
}

/// Deserialize `[watchfox.<section>]`, or `None` when it is absent.
fn section<T: DeserializeOwned>(ctx: &ExecutionContext, name: &str) -> Result<Option<T>> {
    ctx.config_value(name)
        .map(|value| serde_json::from_value(value.clone()))
        .transpose()
        .with_context(|| format!("invalid [watchfox.{}] configuration", name))
}

// =============================================================================
// Event log
// =============================================================================

/// Logs a one-line summary of every event.
#[derive(Debug, Clone, Copy)]
pub struct LogEvents;

#[async_trait]
impl<P: EventPayload> Handler<P> for LogEvents {
    async fn handle(&self, _ctx: ExecutionContext, payload: &P) -> Result<()> {
        let payload = payload.clone().into_payload();
        info!(
            event = %payload.kind(),
            id = payload.match_id(),
            "{}",
            describe(&payload)
        );
        Ok(())
    }
}

fn player(player: &Player) -> String {
    format!("{} ({})", player.nick, player.rank)
}

fn clock(clock: &Clock) -> String {
    format!(
        "{}:{:02} +{}x{}s",
        clock.main_time / 60,
        clock.main_time % 60,
        clock.byoyomi,
        clock.byoyomi_time
    )
}

/// Human-readable summary of a payload.
pub fn describe(payload: &Payload) -> String {
    match payload {
        Payload::MatchStart(start) => format!(
            "{} vs {}, komi {}, handicap {}",
            player(&start.black),
            player(&start.white),
            start.settings.komi,
            start.settings.handicap
        ),
        Payload::MatchTime(time) => format!(
            "black {}, white {}",
            clock(&time.black_time),
            clock(&time.white_time)
        ),
        Payload::MatchMove(mv) => format!(
            "move {}: {}",
            mv.move_number,
            announce_move(Color::from(mv.turn), mv.mv, CoordinateSystem::Fox)
        ),
        Payload::MatchChat(chat) => format!("{} [{}]: {}", chat.nick, chat.rank, chat.message),
        Payload::MatchEnd(end) => match parse_result(&end.result) {
            Ok(result) => result.to_string(),
            Err(_) => end.result.clone(),
        },
    }
}

// =============================================================================
// Scoreboard
// =============================================================================

/// OBS text sources the scoreboard writes to. Unset labels are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoreboardLabels {
    pub black: Option<String>,
    pub white: Option<String>,
    pub moves: Option<String>,
    pub result: Option<String>,
}

/// Keeps player names, the move counter, and the result on screen.
#[derive(Debug, Clone, Copy)]
pub struct Scoreboard;

impl Scoreboard {
    async fn set(ctx: &ExecutionContext, label: Option<&String>, text: &str) -> Result<()> {
        if let Some(label) = label {
            debug!(label = %label, text, "updating scoreboard");
            ctx.obs().label(label.as_str()).set_text(text).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Handler<MatchStart> for Scoreboard {
    async fn handle(&self, ctx: ExecutionContext, start: &MatchStart) -> Result<()> {
        let Some(labels) = section::<ScoreboardLabels>(&ctx, "labels")? else {
            return Ok(());
        };
        Self::set(&ctx, labels.black.as_ref(), &player(&start.black)).await?;
        Self::set(&ctx, labels.white.as_ref(), &player(&start.white)).await?;
        Self::set(&ctx, labels.moves.as_ref(), "0").await?;
        Self::set(&ctx, labels.result.as_ref(), "").await
    }
}

#[async_trait]
impl Handler<MatchMove> for Scoreboard {
    async fn handle(&self, ctx: ExecutionContext, mv: &MatchMove) -> Result<()> {
        let Some(labels) = section::<ScoreboardLabels>(&ctx, "labels")? else {
            return Ok(());
        };
        Self::set(&ctx, labels.moves.as_ref(), &mv.move_number.to_string()).await
    }
}

#[async_trait]
impl Handler<MatchEnd> for Scoreboard {
    async fn handle(&self, ctx: ExecutionContext, end: &MatchEnd) -> Result<()> {
        let Some(labels) = section::<ScoreboardLabels>(&ctx, "labels")? else {
            return Ok(());
        };
        let text = match parse_result(&end.result) {
            Ok(result) => result.to_string(),
            Err(e) => {
                warn!(error = %e, "showing unparsed result");
                end.result.clone()
            }
        };
        Self::set(&ctx, labels.result.as_ref(), &text).await
    }
}

// =============================================================================
// Move audio
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    pub dir: PathBuf,
    #[serde(default)]
    pub system: CoordinateSystem,
    pub player: Option<String>,
}

#[derive(Debug)]
struct AudioCue {
    queue: AudioQueue,
    settings: AudioSettings,
}

/// Queues the announcement for each move.
///
/// Concurrent move invocations can still be queueing when `processing_end`
/// fires, so the queue is drained by [`MoveAudio::finish`] after the run.
///
/// The audio worker starts on first use, so registering this costs nothing
/// when `[watchfox.audio]` is absent.
#[derive(Debug, Clone, Default)]
pub struct MoveAudio {
    cue: Arc<OnceLock<Option<AudioCue>>>,
}

impl MoveAudio {
    fn cue(&self, ctx: &ExecutionContext) -> Option<&AudioCue> {
        self.cue
            .get_or_init(|| match section::<AudioSettings>(ctx, "audio") {
                Ok(Some(settings)) => {
                    let player = settings
                        .player
                        .as_deref()
                        .and_then(PlayerCommand::parse)
                        .unwrap_or_default();
                    info!(dir = %settings.dir.display(), system = %settings.system, "move audio enabled");
                    Some(AudioCue {
                        queue: AudioQueue::spawn(player),
                        settings,
                    })
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "move audio disabled");
                    None
                }
            })
            .as_ref()
    }

    /// Play whatever is still queued and stop the worker. Returns the number
    /// of files played; zero when audio never started.
    pub async fn finish(&self) -> u64 {
        let Some(Some(cue)) = self.cue.get() else {
            return 0;
        };
        let played = cue.queue.join().await;
        info!(played, "move audio finished");
        played
    }
}

#[async_trait]
impl Handler<MatchMove> for MoveAudio {
    async fn handle(&self, ctx: ExecutionContext, mv: &MatchMove) -> Result<()> {
        if let Some(cue) = self.cue(&ctx) {
            cue.queue.play_move(
                &cue.settings.dir,
                cue.settings.system,
                Color::from(mv.turn),
                mv.mv,
            );
        }
        Ok(())
    }
}
