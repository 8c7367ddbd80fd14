use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

use super::process::EnvMap;
use super::LaunchError;

pub const POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const CONFIG_FILE_NAME: &str = "briefer.json";
pub const SETUP_SENTINEL: &str = "setup";

/// Locations of the shared config file and the setup sentinel for one user.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub dir: PathBuf,
    pub config_file: PathBuf,
    pub sentinel: PathBuf,
}

impl ConfigPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            config_file: dir.join(CONFIG_FILE_NAME),
            sentinel: dir.join(SETUP_SENTINEL),
            dir,
        }
    }

    /// `$HOME/.config/briefer`
    pub fn for_home(home: impl AsRef<Path>) -> Self {
        Self::new(home.as_ref().join(".config").join("briefer"))
    }

    pub fn from_env() -> Result<Self, LaunchError> {
        let home = std::env::var_os("HOME").ok_or(LaunchError::NoHome)?;
        Ok(Self::for_home(home))
    }
}

/// Shared configuration written by setup and read by every launcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LauncherConfig {
    values: Map<String, Value>,
}

impl LauncherConfig {
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub async fn load(path: &Path) -> Result<Self, LaunchError> {
        let raw = fs::read(path).await?;
        match serde_json::from_slice(&raw)? {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(LaunchError::InvalidConfig {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn require(&self, key: &str) -> Result<String, LaunchError> {
        self.get(key)
            .ok_or_else(|| LaunchError::MissingKey(key.to_string()))
    }

    /// For every key already in the config, a value in `env` replaces it.
    /// Keys only present in `env` are not added.
    pub fn apply_env_overrides(&mut self, env: &EnvMap) {
        for (key, value) in self.values.iter_mut() {
            if let Some(overridden) = env.get(key) {
                *value = Value::String(overridden.clone());
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Blocks while the setup sentinel exists.
pub async fn wait_setup(paths: &ConfigPaths) {
    while fs::try_exists(&paths.sentinel).await.unwrap_or(false) {
        info!("Waiting for setup to finish");
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Blocks until the config file exists, then loads it.
pub async fn wait_config(paths: &ConfigPaths) -> Result<LauncherConfig, LaunchError> {
    while !fs::try_exists(&paths.config_file).await.unwrap_or(false) {
        info!("Waiting for config file");
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    info!("Reading config file {}", paths.config_file.display());
    LauncherConfig::load(&paths.config_file).await
}
