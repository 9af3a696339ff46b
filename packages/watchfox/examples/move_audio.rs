//! Announce every move of a live minifox match through the speakers.
//!
//! Expects pre-rendered files at `audio/fox/<color>.<row>.<col>.mp3` and
//! uses a mock OBS, so only minifox needs to be running.
//!
//! ```sh
//! MINIFOX_SSE_URL=http://localhost:8000/events cargo run -p watchfox --example move_audio
//! ```

use anyhow::Result;
use watchfox::audio::{AudioQueue, PlayerCommand};
use watchfox::control::RecordingRequester;
use watchfox::go::{Color, CoordinateSystem};
use watchfox::{source, Engine, ExecutionContext, HandlerRegistry, MatchMove};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let url = std::env::var("MINIFOX_SSE_URL")
        .unwrap_or_else(|_| "http://localhost:8000/events".to_string());
    let audio = AudioQueue::spawn(PlayerCommand::default());

    let mut registry = HandlerRegistry::new();
    let queue = audio.clone();
    registry.on::<MatchMove, _, _>(move |_ctx, mv| {
        let queue = queue.clone();
        async move {
            let color = if mv.move_number % 2 == 0 {
                Color::White
            } else {
                Color::Black
            };
            tracing::info!(%color, mv = %mv.mv, "playing audio");
            queue.play_move("audio", CoordinateSystem::Fox, color, mv.mv);
            Ok(())
        }
    });

    let (obs, _) = RecordingRequester::manager();
    let engine = Engine::new(registry, ExecutionContext::new(obs, Default::default()));
    let report = engine.run(source::connect(&url).await?).await?;

    let played = audio.join().await;
    println!("{} events, {} sounds played", report.received, played);
    Ok(())
}
