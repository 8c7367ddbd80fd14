//! Thin async wrapper over the `docker` command line client.

use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

use super::{ContainerError, CONTAINER_PORT};

/// Everything needed for `docker run -d`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub volumes: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
}

impl RunSpec {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "-p".to_string(),
            format!("{}:{}", self.host_port, CONTAINER_PORT),
            "--name".to_string(),
            self.name.clone(),
        ];

        for (volume, mount) in &self.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}:rw", volume, mount));
        }

        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(self.image.clone());
        args
    }
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs a command with captured output and returns trimmed stdout.
    async fn output(&self, args: &[&str]) -> Result<String, ContainerError> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ContainerError::Command {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs a command with the terminal attached.
    async fn interactive(&self, args: &[&str]) -> Result<ExitStatus, ContainerError> {
        debug!("{} {}", self.binary, args.join(" "));
        Ok(Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .await?)
    }

    pub async fn ping(&self) -> Result<(), ContainerError> {
        self.output(&["info", "--format", "{{.ServerVersion}}"])
            .await
            .map(|_| ())
            .map_err(|_| ContainerError::EngineUnavailable)
    }

    pub async fn container_exists(&self, name: &str) -> bool {
        self.output(&["container", "inspect", name]).await.is_ok()
    }

    pub async fn is_running(&self, name: &str) -> bool {
        matches!(
            self.output(&["container", "inspect", "--format", "{{.State.Running}}", name])
                .await
                .as_deref(),
            Ok("true")
        )
    }

    pub async fn ensure_volume(&self, name: &str) -> Result<(), ContainerError> {
        if self.output(&["volume", "inspect", name]).await.is_err() {
            self.output(&["volume", "create", name]).await?;
        }
        Ok(())
    }

    pub async fn image_present(&self, image: &str) -> bool {
        self.output(&["image", "inspect", image]).await.is_ok()
    }

    /// Pulls with progress shown on the terminal.
    pub async fn pull(&self, image: &str) -> Result<(), ContainerError> {
        let status = self.interactive(&["pull", image]).await?;
        if status.success() {
            Ok(())
        } else {
            Err(ContainerError::Command {
                command: "pull".to_string(),
                stderr: format!("exit status {}", status),
            })
        }
    }

    pub async fn stop(&self, name: &str) -> Result<(), ContainerError> {
        self.output(&["stop", name]).await.map(|_| ())
    }

    pub async fn restart(&self, name: &str) -> Result<(), ContainerError> {
        self.output(&["restart", name]).await.map(|_| ())
    }

    pub async fn remove(&self, name: &str) -> Result<(), ContainerError> {
        self.output(&["rm", name]).await.map(|_| ())
    }

    /// Starts a detached container and returns its id.
    pub async fn run(&self, spec: &RunSpec) -> Result<String, ContainerError> {
        let args = spec.args();
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.output(&refs).await
    }

    /// Streams the container's output until it exits. Signals stay with us.
    pub async fn attach(&self, name: &str) -> Result<(), ContainerError> {
        self.interactive(&["attach", "--no-stdin", "--sig-proxy=false", name])
            .await
            .map(|_| ())
    }
}
