//! Core library for the Briefer support services: the AI prompt-chain API,
//! the notebook file bridge, the in-container process launchers and the
//! container CLI.

pub mod ai;
pub mod config;
pub mod container;
pub mod error;
pub mod files;
pub mod handlers;
pub mod launcher;
pub mod middleware;
pub mod telemetry;

pub use ai::{LlmError, LlmProvider, ModelRegistry};
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use handlers::routes::{create_ai_routes, create_bridge_routes};
pub use middleware::cors::cors_layer_from_config;

use axum::Router;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub version: String,
    pub config: Arc<AppConfig>,
    pub models: ModelRegistry,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let models = ModelRegistry::new(config.llm.clone())?;
        Ok(Self::with_models(config, models))
    }

    pub fn with_models(config: AppConfig, models: ModelRegistry) -> Self {
        Self {
            app_name: "Briefer".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config: Arc::new(config),
            models,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(config: AppConfig) -> Self {
        let provider = ai::testing::ScriptedProvider::new(Vec::new());
        Self::with_models(config, ModelRegistry::with_provider(provider))
    }
}

pub fn create_ai_app(state: AppState) -> Router {
    let cors = cors_layer_from_config(&state.config.cors);

    Router::new()
        .merge(create_ai_routes(state.clone()))
        .layer(cors)
        .layer(middleware::logging::logging_layer())
        .with_state(state)
}

pub fn create_bridge_app(state: AppState) -> Router {
    Router::new()
        .merge(create_bridge_routes(state.clone()))
        .layer(middleware::logging::logging_layer())
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<()> {
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
