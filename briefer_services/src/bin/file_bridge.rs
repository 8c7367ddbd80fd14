//! File bridge endpoints for notebook hosts.

use anyhow::{Context, Result};
use briefer_core::{create_bridge_app, handlers::bridge_prefix, run_server, telemetry, AppConfig, AppState};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing(env!("CARGO_CRATE_NAME"));

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate_bridge().context("Invalid file bridge configuration")?;

    let addr: SocketAddr = config
        .bridge_bind_address()
        .parse()
        .context("Invalid bind address")?;

    info!("Serving files under {}", bridge_prefix(&config.bridge.base_url));

    let state = AppState::new(config).context("Failed to initialise application state")?;
    run_server(create_bridge_app(state), addr).await?;

    info!("Server shutdown complete");
    Ok(())
}
