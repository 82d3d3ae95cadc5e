use anyhow::Context;
use tourbook::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config)?;

    let state = AppState::builder()
        .config(config.clone())
        .build()
        .await
        .context("Failed to build application state")?;

    Server::new(config).serve(app(state)).await?;

    shutdown_tracing();
    Ok(())
}
