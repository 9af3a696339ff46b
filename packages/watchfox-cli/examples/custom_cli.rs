//! A downstream binary: custom handlers behind the standard commands.
//!
//! ```sh
//! cargo run -p watchfox-cli --example custom_cli -- replay events.jsonl --mock-obs
//! ```
//!
//! `config.toml` needs `config-key = "config-value"` under `[watchfox]`.

use anyhow::{ensure, Result};
use watchfox::{
    ExecutionContext, HandlerRegistry, MatchChat, MatchEnd, MatchMove, MatchStart, MatchTime,
};

fn check_config(ctx: &ExecutionContext) -> Result<()> {
    ensure!(
        ctx.config_str("config-key") == Some("config-value"),
        "[watchfox] config-key must be \"config-value\""
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut registry = HandlerRegistry::new();

    registry
        .on::<MatchStart, _, _>(|ctx, start| async move {
            println!("Event: match_start for game with id={}", start.id);
            check_config(&ctx)
        })
        .on::<MatchTime, _, _>(|ctx, time| async move {
            println!("Event: match_time for game with id={}", time.id);
            check_config(&ctx)
        })
        .on::<MatchMove, _, _>(|ctx, mv| async move {
            println!("Event: match_move for game with id={} ({})", mv.id, mv.mv);
            check_config(&ctx)
        })
        .on::<MatchChat, _, _>(|ctx, chat| async move {
            println!("Event: match_chat for game with id={}", chat.id);
            check_config(&ctx)
        })
        .on::<MatchEnd, _, _>(|ctx, end| async move {
            println!("Event: match_end for game with id={} ({})", end.id, end.result);
            check_config(&ctx)
        });

    watchfox_cli::run_cli(registry).await
}
