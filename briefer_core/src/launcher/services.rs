//! Child plans for the AI API, the web API and the notebook server.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::config::{wait_config, wait_setup, ConfigPaths, LauncherConfig};
use super::process::{current_env, merge_defaults, ChildCommand, EnvMap};
use super::LaunchError;

pub const AI_WORKDIR: &str = "/app/ai";
pub const AI_SCRIPT: &str = "/app/ai/venv/bin/uvicorn api.app:app --host 0.0.0.0 --port ${PORT}";

pub const API_PACKAGE_JSON: &str = "/app/api/apps/api/package.json";
pub const API_SCRIPT: &str =
    "node /app/api/apps/api/dist/src/index.js | /app/api/node_modules/.bin/pino-pretty";

pub const JUPYTER_VENV_BIN: &str = "/app/jupyter/venv/bin";
pub const JUPYTER_WORKDIR: &str = "/home/jupyteruser";
pub const JUPYTER_ARGS: &[&str] = &[
    "server",
    "--ip=0.0.0.0",
    "--ZMQChannelsWebsocketConnection.iopub_data_rate_limit=1.0e10",
    "--ZMQChannelsWebsocketConnection.iopub_msg_rate_limit=1.0e6",
    "--ServerApp.max_body_size=107374182400",
];

pub fn ai_command(cfg: &LauncherConfig, mut env: EnvMap) -> Result<ChildCommand, LaunchError> {
    merge_defaults(
        &mut env,
        [
            ("BASIC_AUTH_USERNAME", cfg.require("AI_BASIC_AUTH_USERNAME")?),
            ("BASIC_AUTH_PASSWORD", cfg.require("AI_BASIC_AUTH_PASSWORD")?),
            ("PORT", "8000".to_string()),
        ],
    );

    Ok(ChildCommand::bash(AI_SCRIPT, env).current_dir(AI_WORKDIR))
}

pub fn api_command(
    cfg: &LauncherConfig,
    mut env: EnvMap,
    version: String,
) -> Result<ChildCommand, LaunchError> {
    merge_defaults(
        &mut env,
        [
            ("NODE_ENV", "production".to_string()),
            ("LOG_LEVEL", "info".to_string()),
            ("API_URL", "/api".to_string()),
            ("FRONTEND_URL", "/".to_string()),
            ("LOGIN_JWT_SECRET", cfg.require("LOGIN_JWT_SECRET")?),
            ("AUTH_JWT_SECRET", cfg.require("AUTH_JWT_SECRET")?),
            ("AI_API_URL", "http://localhost:8000".to_string()),
            ("AI_API_USERNAME", cfg.require("AI_BASIC_AUTH_USERNAME")?),
            ("AI_API_PASSWORD", cfg.require("AI_BASIC_AUTH_PASSWORD")?),
            ("PYTHON_ALLOWED_LIBRARIES", "plotly,matplotlib,numpy,pandas".to_string()),
            ("POSTGRES_USERNAME", cfg.require("POSTGRES_USERNAME")?),
            ("POSTGRES_PASSWORD", cfg.require("POSTGRES_PASSWORD")?),
            ("POSTGRES_HOSTNAME", "localhost".to_string()),
            ("POSTGRES_PORT", "5432".to_string()),
            ("POSTGRES_DATABASE", "briefer".to_string()),
            (
                "ENVIRONMENT_VARIABLES_ENCRYPTION_KEY",
                cfg.require("ENVIRONMENT_VARIABLES_ENCRYPTION_KEY")?,
            ),
            (
                "WORKSPACE_SECRETS_ENCRYPTION_KEY",
                cfg.require("WORKSPACE_SECRETS_ENCRYPTION_KEY")?,
            ),
            ("DATASOURCES_ENCRYPTION_KEY", cfg.require("DATASOURCES_ENCRYPTION_KEY")?),
            ("JUPYTER_HOST", "localhost".to_string()),
            ("JUPYTER_PORT", "8888".to_string()),
            ("JUPYTER_TOKEN", cfg.require("JUPYTER_TOKEN")?),
        ],
    );

    let ssl_unset = env
        .get("POSTGRES_SSL_DISABLED")
        .map_or(true, |v| v.is_empty());
    if env.get("POSTGRES_HOSTNAME").map(String::as_str) == Some("localhost") && ssl_unset {
        env.insert("POSTGRES_SSL_DISABLED".to_string(), "true".to_string());
    }

    env.insert("VERSION".to_string(), version);

    Ok(ChildCommand::bash(API_SCRIPT, env))
}

pub fn jupyter_command(cfg: &LauncherConfig, mut env: EnvMap) -> Result<ChildCommand, LaunchError> {
    env.insert("JUPYTER_TOKEN".to_string(), cfg.require("JUPYTER_TOKEN")?);

    let path = env.get("PATH").cloned().unwrap_or_default();
    env.insert("PATH".to_string(), format!("{}:{}", JUPYTER_VENV_BIN, path));

    let program = format!("{}/jupyter", JUPYTER_VENV_BIN);
    Ok(ChildCommand::new(program, JUPYTER_ARGS, env).current_dir(JUPYTER_WORKDIR))
}

#[derive(Deserialize)]
struct PackageJson {
    version: Option<String>,
}

pub async fn read_package_version(path: &Path) -> Result<String, LaunchError> {
    let raw = tokio::fs::read(path).await?;
    let package: PackageJson = serde_json::from_slice(&raw)?;
    package
        .version
        .ok_or_else(|| LaunchError::MissingKey("version".to_string()))
}

/// Waits for setup, loads the config and applies environment overrides.
async fn prepare() -> Result<(LauncherConfig, EnvMap), LaunchError> {
    let paths = ConfigPaths::from_env()?;
    wait_setup(&paths).await;

    let env = current_env();
    let mut cfg = wait_config(&paths).await?;
    cfg.apply_env_overrides(&env);
    Ok((cfg, env))
}

pub async fn run_ai() -> Result<(), LaunchError> {
    let (cfg, env) = prepare().await?;
    info!("Running AI API");
    ai_command(&cfg, env)?.run().await
}

pub async fn run_api() -> Result<(), LaunchError> {
    let (cfg, env) = prepare().await?;
    let version = read_package_version(Path::new(API_PACKAGE_JSON)).await?;
    info!("Running API version {}", version);
    api_command(&cfg, env, version)?.run().await
}

pub async fn run_jupyter() -> Result<(), LaunchError> {
    let (cfg, env) = prepare().await?;
    info!("Running notebook server");
    jupyter_command(&cfg, env)?.run().await
}
