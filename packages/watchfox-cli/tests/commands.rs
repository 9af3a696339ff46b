//! The command surface end to end, against recordings and a mock OBS.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tempfile::TempDir;
use watchfox::recording::{events_from, record_events};
use watchfox::testing::InvocationLog;
use watchfox::{HandlerRegistry, MatchEnd, ServerSentEvent};
use watchfox_cli::{run_with, Cli};

const CONFIG: &str = r#"
[minifoxwq]
sse_url = "http://127.0.0.1:9/events"

[watchfox]
config-key = "config-value"
"#;

fn feed() -> Vec<ServerSentEvent> {
    vec![
        ServerSentEvent::with_json(
            "match_move",
            &json!({"id": "g1", "move": [15, 3], "move_number": 1, "turn": "B"}),
        ),
        ServerSentEvent::with_json(
            "match_chat",
            &json!({"id": "g1", "country": "JP", "nick": "kibitzer", "rank": "1d", "message": "!"}),
        ),
        ServerSentEvent::with_json("match_end", &json!({"id": "g1", "result": "B+ R"})),
    ]
}

async fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
    record_events(dir.path().join("events.jsonl"), false, events_from(feed()))
        .await
        .unwrap();
    dir
}

fn replay_cli(dir: &Path, extra: &[&str]) -> Cli {
    let config = dir.join("config.toml");
    let events = dir.join("events.jsonl");
    let mut args = vec![
        "watchfox".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "replay".to_string(),
        events.display().to_string(),
        "--sleep".to_string(),
        "0".to_string(),
        "--mock-obs".to_string(),
        "--mode".to_string(),
        "sequential".to_string(),
    ];
    args.extend(extra.iter().map(|arg| arg.to_string()));
    Cli::try_parse_from(args).unwrap()
}

#[tokio::test]
async fn test_replay_brackets_recording_with_lifecycle_events() {
    let dir = workspace().await;
    let log = InvocationLog::new();
    let mut registry = HandlerRegistry::new();
    log.register_all(&mut registry);

    run_with(replay_cli(dir.path(), &[]), registry).await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "processing_start",
            "match_move:g1",
            "match_chat:g1",
            "match_end:g1",
            "processing_end",
        ]
    );
}

#[tokio::test]
async fn test_handlers_see_the_watchfox_table() {
    let dir = workspace().await;
    let saw_config = Arc::new(AtomicBool::new(false));

    let mut registry = HandlerRegistry::new();
    let flag = saw_config.clone();
    registry.on::<MatchEnd, _, _>(move |ctx, _end| {
        let flag = flag.clone();
        async move {
            flag.store(
                ctx.config_str("config-key") == Some("config-value"),
                Ordering::SeqCst,
            );
            Ok(())
        }
    });

    run_with(replay_cli(dir.path(), &[]), registry).await.unwrap();
    assert!(saw_config.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_replay_filters_apply() {
    let dir = workspace().await;
    let log = InvocationLog::new();
    let mut registry = HandlerRegistry::new();
    log.register_all(&mut registry);

    run_with(
        replay_cli(
            dir.path(),
            &["--allow", "match_move", "--allow", "match_chat", "--deny", "match_chat"],
        ),
        registry,
    )
    .await
    .unwrap();

    assert_eq!(
        log.entries(),
        vec!["processing_start", "match_move:g1", "processing_end"]
    );
}

#[tokio::test]
async fn test_corrupt_recording_fails_the_command() {
    let dir = workspace().await;
    let events = dir.path().join("events.jsonl");
    let mut content = std::fs::read_to_string(&events).unwrap();
    content.push_str("{ not json\n");
    std::fs::write(&events, content).unwrap();

    let log = InvocationLog::new();
    let mut registry = HandlerRegistry::new();
    log.register_all(&mut registry);

    let result = run_with(replay_cli(dir.path(), &[]), registry).await;

    // Everything before the corrupt line is handled and processing_end still fires
    assert!(result.is_err());
    assert_eq!(
        log.entries(),
        vec![
            "processing_start",
            "match_move:g1",
            "match_chat:g1",
            "match_end:g1",
            "processing_end",
        ]
    );
}

#[tokio::test]
async fn test_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("absent.toml").display().to_string();
    let cli = Cli::try_parse_from([
        "watchfox",
        "--config",
        config.as_str(),
        "run",
        "--mock-obs",
    ])
    .unwrap();

    assert!(run_with(cli, HandlerRegistry::new()).await.is_err());
}
