//! Process launchers run inside the Briefer container.
//!
//! Each launcher waits for the one-shot setup to finish, loads the shared JSON
//! configuration, derives a child environment and runs a single service in the
//! foreground. The launcher exits with the child's exit code.

pub mod config;
pub mod process;
pub mod services;
pub mod setup;

pub use config::{ConfigPaths, LauncherConfig, POLL_INTERVAL};
pub use process::{merge_defaults, ChildCommand, EnvMap};
pub use services::{run_ai, run_api, run_jupyter};
pub use setup::run_setup;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("HOME is not set")]
    NoHome,

    #[error("config file {path} is not a JSON object")]
    InvalidConfig { path: String },

    #[error("config key {0} is missing")]
    MissingKey(String),

    #[error("{program} exited with code {code}")]
    ChildFailed { program: String, code: i32 },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown user or group {0}")]
    UnknownUser(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LaunchError {
    /// Process exit code a launcher should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::ChildFailed { code, .. } => *code,
            _ => 1,
        }
    }
}
