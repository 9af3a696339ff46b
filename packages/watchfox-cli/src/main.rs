use anyhow::Result;
use watchfox::HandlerRegistry;
use watchfox_cli::handlers;

#[tokio::main]
async fn main() -> Result<()> {
    let mut registry = HandlerRegistry::new();
    let audio = handlers::register_stock(&mut registry);

    let result = watchfox_cli::run_cli(registry).await;
    audio.finish().await;
    result
}
