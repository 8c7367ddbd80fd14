//! Local container management behind the `briefer` command.

pub mod docker;
pub mod runner;

pub use docker::{DockerCli, RunSpec};
pub use runner::{
    find_free_port, forwarded_env, normalize_image, parse_action, run, should_pull, ExistingAction,
    RunOptions,
};

use thiserror::Error;

pub const CONTAINER_NAME: &str = "briefer";
pub const DEFAULT_IMAGE: &str = "briefercloud/briefer";
pub const CONTAINER_PORT: u16 = 3000;
pub const FIRST_HOST_PORT: u16 = 3000;

/// Named volumes and where they are mounted inside the container.
pub const VOLUMES: &[(&str, &str)] = &[
    ("briefer_psql_data", "/var/lib/postgresql/data"),
    ("briefer_jupyter_data", "/home/jupyteruser"),
    ("briefer_briefer_data", "/home/briefer"),
];

/// Host variables copied into the container when set.
pub const FORWARDED_ENV_VARS: &[&str] = &[
    "LOG_LEVEL",
    "ALLOW_HTTP",
    "POSTGRES_USERNAME",
    "POSTGRES_PASSWORD",
    "POSTGRES_HOSTNAME",
    "POSTGRES_PORT",
    "POSTGRES_DATABASE",
    "AI_API_URL",
    "AI_API_USERNAME",
    "AI_API_PASSWORD",
    "JUPYTER_HOST",
    "JUPYTER_PORT",
    "JUPYTER_TOKEN",
    "DISABLE_CUSTOM_OAI_KEY",
];

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Docker is not running.")]
    EngineUnavailable,

    #[error("docker {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("invalid action.")]
    InvalidAction(String),

    #[error("no free port found starting at {0}")]
    NoFreePort(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
