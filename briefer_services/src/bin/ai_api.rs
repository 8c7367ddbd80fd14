//! HTTP API serving the prompt chains.

use anyhow::{Context, Result};
use briefer_core::{create_ai_app, run_server, telemetry, AppConfig, AppState};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing(env!("CARGO_CRATE_NAME"));

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate_ai().context("Invalid AI API configuration")?;

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid bind address")?;

    info!("Default model: {}", config.llm.default_model);
    if config.llm.use_azure {
        info!("Using Azure OpenAI deployment {}", config.llm.azure_deployment);
    }

    let state = AppState::new(config).context("Failed to initialise model registry")?;
    info!("{} AI API v{}", state.app_name, state.version);

    run_server(create_ai_app(state), addr).await?;

    info!("Server shutdown complete");
    Ok(())
}
