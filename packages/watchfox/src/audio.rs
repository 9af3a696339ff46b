//! Audio cues played one at a time through an external player.
//!
//! Handlers may queue sounds from any task; a single worker plays them in
//! queue order so announcements never overlap.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::go::{Color, CoordinateSystem};
use crate::payload::Move;

/// Player used when none is configured.
pub const DEFAULT_PLAYER: &str = "mpv --no-video --really-quiet";

/// Path of the pre-rendered announcement for a move:
/// `<root>/<system>/<color>.<row>.<col>.mp3`, with a pass as `-1.-1`.
pub fn move_audio_path(
    root: impl AsRef<Path>,
    system: CoordinateSystem,
    color: Color,
    mv: Move,
) -> PathBuf {
    let (row, col) = mv.coordinates();
    root.as_ref()
        .join(system.as_str())
        .join(format!("{}.{}.{}.mp3", color, row, col))
}

/// External program that plays one file, given as its last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PlayerCommand {
    /// Split a command line on whitespace. Returns `None` for an empty line.
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Default for PlayerCommand {
    fn default() -> Self {
        Self {
            program: "mpv".into(),
            args: vec!["--no-video".into(), "--really-quiet".into()],
        }
    }
}

enum AudioTask {
    Play(PathBuf),
    Stop,
}

/// Handle to the audio worker. Cheap to clone.
#[derive(Clone)]
pub struct AudioQueue {
    tx: mpsc::UnboundedSender<AudioTask>,
    worker: Arc<Mutex<Option<JoinHandle<u64>>>>,
}

impl AudioQueue {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn spawn(player: PlayerCommand) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(player = ?player, "starting audio worker");
        let worker = tokio::spawn(play_queue(player, rx));

        Self {
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Queue `path` for playback. Never waits for playback.
    pub fn play(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        info!(path = %path.display(), "queueing audio");
        if self.tx.send(AudioTask::Play(path)).is_err() {
            warn!("audio worker already stopped; dropping sound");
        }
    }

    pub fn play_move(
        &self,
        root: impl AsRef<Path>,
        system: CoordinateSystem,
        color: Color,
        mv: Move,
    ) {
        self.play(move_audio_path(root, system, color, mv));
    }

    /// Play everything queued so far, then stop the worker.
    ///
    /// Returns the number of files played successfully. Later calls return 0.
    pub async fn join(&self) -> u64 {
        let Some(worker) = self.worker.lock().await.take() else {
            return 0;
        };
        let _ = self.tx.send(AudioTask::Stop);
        match worker.await {
            Ok(played) => played,
            Err(e) => {
                warn!(error = %e, "audio worker failed");
                0
            }
        }
    }
}

impl std::fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioQueue").finish_non_exhaustive()
    }
}

async fn play_queue(player: PlayerCommand, mut rx: mpsc::UnboundedReceiver<AudioTask>) -> u64 {
    let mut played = 0;
    while let Some(task) = rx.recv().await {
        let path = match task {
            AudioTask::Play(path) => path,
            AudioTask::Stop => break,
        };
        if play_file(&player, &path).await {
            played += 1;
        }
    }
    debug!(played, "audio worker stopped");
    played
}

async fn play_file(player: &PlayerCommand, path: &Path) -> bool {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!(path = %path.display(), "audio file not found");
        return false;
    }

    debug!(path = %path.display(), "playing audio");
    let status = Command::new(&player.program)
        .args(&player.args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!(path = %path.display(), %status, "audio player failed");
            false
        }
        Err(e) => {
            warn!(program = %player.program, error = %e, "could not start audio player");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_move_audio_path() {
        let path = move_audio_path(
            "assets/audio",
            CoordinateSystem::Ogs,
            Color::Black,
            Move::Play { row: 3, col: 15 },
        );
        assert_eq!(path, PathBuf::from("assets/audio/ogs/black.3.15.mp3"));

        let pass = move_audio_path("a", CoordinateSystem::Fox, Color::White, Move::Pass);
        assert_eq!(pass, PathBuf::from("a/fox/white.-1.-1.mp3"));
    }

    #[test]
    fn test_player_command_parse() {
        assert_eq!(
            PlayerCommand::parse(DEFAULT_PLAYER),
            Some(PlayerCommand::default())
        );
        assert_eq!(PlayerCommand::parse("   "), None);
    }

    #[tokio::test]
    async fn test_plays_in_queue_order() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("played.log");
        let player = PlayerCommand {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                format!("basename \"$0\" >> '{}'", log.display()),
            ],
        };

        let queue = AudioQueue::spawn(player);
        for name in ["one.mp3", "two.mp3", "three.mp3"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"").unwrap();
            queue.play(path);
        }

        assert_eq!(queue.join().await, 3);
        let played = std::fs::read_to_string(&log).unwrap();
        assert_eq!(played, "one.mp3\ntwo.mp3\nthree.mp3\n");
    }

    #[tokio::test]
    async fn test_missing_file_and_failing_player_are_skipped() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("exists.mp3");
        std::fs::write(&existing, b"").unwrap();

        let queue = AudioQueue::spawn(PlayerCommand::parse("false").unwrap());
        queue.play(dir.path().join("missing.mp3"));
        queue.play(&existing);
        assert_eq!(queue.join().await, 0);

        // Worker is gone; queueing is a logged no-op
        queue.play(&existing);
        assert_eq!(queue.join().await, 0);
    }
}
