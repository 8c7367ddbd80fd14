use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{error, info};

use super::LaunchError;

pub type EnvMap = BTreeMap<String, String>;

/// Snapshot of the launcher's own environment.
pub fn current_env() -> EnvMap {
    std::env::vars().collect()
}

/// Adds each default whose key is not already set.
pub fn merge_defaults<'a, I>(env: &mut EnvMap, defaults: I)
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    for (key, value) in defaults {
        env.entry(key.to_string()).or_insert(value);
    }
}

/// A foreground child process with a fully specified environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: EnvMap,
}

impl ChildCommand {
    pub fn new(program: impl Into<String>, args: &[&str], env: EnvMap) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            env,
        }
    }

    /// Runs `script` through `bash -c`, so pipes and `${VAR}` expansion work.
    pub fn bash(script: &str, env: EnvMap) -> Self {
        Self::new("bash", &["-c", script], env)
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Runs to completion. A non-zero exit becomes [`LaunchError::ChildFailed`].
    pub async fn run(&self) -> Result<(), LaunchError> {
        info!("Running {} {}", self.program, self.args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(&self.args).env_clear().envs(&self.env);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let status = command.status().await.map_err(|source| LaunchError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if status.success() {
            return Ok(());
        }

        // Killed by a signal: no code, report a generic failure.
        let code = status.code().unwrap_or(1);
        error!("{} exited with code {}", self.program, code);
        Err(LaunchError::ChildFailed {
            program: self.program.clone(),
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_defaults_keeps_existing() {
        let mut env: EnvMap = [("PORT".to_string(), "9000".to_string())].into_iter().collect();
        merge_defaults(
            &mut env,
            [("PORT", "8000".to_string()), ("NODE_ENV", "production".to_string())],
        );

        assert_eq!(env["PORT"], "9000");
        assert_eq!(env["NODE_ENV"], "production");
    }

    #[tokio::test]
    async fn test_child_exit_code_is_reported() {
        let mut env = EnvMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());

        let ok = ChildCommand::new("sh", &["-c", "exit 0"], env.clone());
        assert!(ok.run().await.is_ok());

        let failing = ChildCommand::new("sh", &["-c", "exit 3"], env);
        match failing.run().await {
            Err(LaunchError::ChildFailed { code, .. }) => assert_eq!(code, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_child_sees_only_given_env() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.txt");

        let mut env = EnvMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env.insert("GREETING".to_string(), "hello".to_string());
        env.insert("OUT".to_string(), out.display().to_string());

        ChildCommand::new("sh", &["-c", "printf %s \"$GREETING\" > \"$OUT\""], env)
            .current_dir(dir.path())
            .run()
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(out).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = ChildCommand::new("/nonexistent/program", &[], EnvMap::new());
        assert!(matches!(cmd.run().await, Err(LaunchError::Spawn { .. })));
    }
}
