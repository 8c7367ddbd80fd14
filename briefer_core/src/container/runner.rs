//! The `briefer` command flow: start, reuse or stop the local container.

use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::docker::{DockerCli, RunSpec};
use super::{ContainerError, CONTAINER_NAME, FIRST_HOST_PORT, FORWARDED_ENV_VARS, VOLUMES};

const READINESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub image: String,
    pub detach: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingAction {
    Leave,
    Stop,
    Restart,
}

/// Interprets the answer to the "already running" prompt.
pub fn parse_action(input: &str) -> Result<ExistingAction, ContainerError> {
    match input.trim() {
        "" => Ok(ExistingAction::Leave),
        "stop" => Ok(ExistingAction::Stop),
        "restart" => Ok(ExistingAction::Restart),
        other => Err(ContainerError::InvalidAction(other.to_string())),
    }
}

/// `org/name` without a tag means `org/name:latest`.
pub fn normalize_image(image: &str) -> String {
    if !image.contains(':') && image.contains('/') {
        format!("{}:latest", image)
    } else {
        image.to_string()
    }
}

/// Remote `latest` images are always refreshed; anything else only when missing.
pub fn should_pull(image: &str, present_locally: bool) -> bool {
    (image.contains('/') && image.contains("latest")) || !present_locally
}

pub fn forwarded_env<F>(lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    FORWARDED_ENV_VARS
        .iter()
        .filter_map(|key| lookup(key).map(|value| (key.to_string(), value)))
        .collect()
}

fn is_port_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// First port at or above `start` that can be bound on all interfaces.
pub fn find_free_port(start: u16) -> Result<u16, ContainerError> {
    (start..=u16::MAX)
        .find(|port| is_port_free(*port))
        .ok_or(ContainerError::NoFreePort(start))
}

async fn prompt(message: &str) -> Result<String, ContainerError> {
    print!("{}", message);
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line)
}

async fn handle_existing(docker: &DockerCli, detach: bool) -> Result<(), ContainerError> {
    eprintln!("Error: Briefer is already running.");
    let answer = prompt("Do you want to stop or restart it?\nPress enter to leave it running.\n[stop/restart]: ").await?;

    match parse_action(&answer)? {
        ExistingAction::Leave => Ok(()),
        ExistingAction::Stop => {
            println!("Stopping Briefer...");
            docker.stop(CONTAINER_NAME).await?;
            println!("Briefer stopped.");
            Ok(())
        }
        ExistingAction::Restart => {
            println!("Restarting Briefer...");
            docker.restart(CONTAINER_NAME).await?;
            if !detach {
                attach_until_interrupted(docker).await?;
            }
            Ok(())
        }
    }
}

async fn pull_image(docker: &DockerCli, image: &str) -> Result<(), ContainerError> {
    println!("Downloading image {}...", image);
    let has_some_version = docker.image_present(image).await;

    match docker.pull(image).await {
        Ok(()) => {
            println!("Downloaded image {}.", image);
            Ok(())
        }
        Err(_) if has_some_version => {
            eprintln!("Error: failed to download image {}. Using cached version.", image);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn open_browser(url: &str) {
    let (program, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![url])
    } else if cfg!(target_os = "windows") {
        ("cmd", vec!["/C", "start", url])
    } else {
        ("xdg-open", vec![url])
    };

    if let Err(e) = tokio::process::Command::new(program).args(&args).status().await {
        warn!("Could not open a browser, visit {} manually: {}", url, e);
    }
}

async fn is_ok(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(e) => {
            debug!("{} not reachable yet: {}", url, e);
            false
        }
    }
}

/// Polls the API readiness probe and then the web app, opening a browser once
/// both answer 200.
pub async fn wait_until_ready(port: u16) -> Result<(), ContainerError> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
    let api_url = format!("http://localhost:{}/api", port);
    let web_url = format!("http://localhost:{}", port);

    loop {
        if is_ok(&client, &format!("{}/readyz", api_url)).await && is_ok(&client, &web_url).await {
            println!("Briefer is ready at {}", web_url);
            open_browser(&web_url).await;
            return Ok(());
        }
        tokio::time::sleep(READINESS_INTERVAL).await;
    }
}

async fn stop_on_interrupt(docker: &DockerCli) -> Result<(), ContainerError> {
    println!("\nCTRL-C detected. Stopping Briefer...");
    docker.stop(CONTAINER_NAME).await?;
    println!("Briefer stopped.");
    Ok(())
}

async fn attach_until_interrupted(docker: &DockerCli) -> Result<(), ContainerError> {
    tokio::select! {
        result = docker.attach(CONTAINER_NAME) => result,
        _ = tokio::signal::ctrl_c() => stop_on_interrupt(docker).await,
    }
}

async fn remove_stale_container(docker: &DockerCli, name: &str) -> Result<(), ContainerError> {
    if !docker.container_exists(name).await {
        return Ok(());
    }
    if let Err(e) = docker.stop(name).await {
        debug!("Stopping stale container {} failed: {}", name, e);
    }
    docker.remove(name).await
}

async fn start_container(docker: &DockerCli, options: &RunOptions) -> Result<(), ContainerError> {
    let image = normalize_image(&options.image);
    let port = find_free_port(FIRST_HOST_PORT)?;

    if should_pull(&image, docker.image_present(&image).await) {
        pull_image(docker, &image).await?;
    }

    // Recreate so new port mappings and env vars apply.
    remove_stale_container(docker, CONTAINER_NAME).await?;

    let spec = RunSpec {
        name: CONTAINER_NAME.to_string(),
        image,
        host_port: port,
        volumes: VOLUMES
            .iter()
            .map(|(volume, mount)| (volume.to_string(), mount.to_string()))
            .collect(),
        env: forwarded_env(|key| std::env::var(key).ok()),
    };
    let id = docker.run(&spec).await?;
    debug!("Started container {}", id);

    let readiness: JoinHandle<Result<(), ContainerError>> = tokio::spawn(wait_until_ready(port));

    if options.detach {
        tokio::select! {
            joined = readiness => match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("Readiness check task failed: {}", e);
                    Ok(())
                }
            },
            _ = tokio::signal::ctrl_c() => stop_on_interrupt(docker).await,
        }
    } else {
        let result = attach_until_interrupted(docker).await;
        readiness.abort();
        result
    }
}

pub async fn run(options: RunOptions) -> Result<(), ContainerError> {
    let docker = DockerCli::default();
    docker.ping().await?;

    if docker.is_running(CONTAINER_NAME).await {
        return handle_existing(&docker, options.detach).await;
    }

    for (volume, _) in VOLUMES {
        docker.ensure_volume(volume).await?;
    }

    start_container(&docker, &options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_normalize_image() {
        assert_eq!(normalize_image("briefercloud/briefer"), "briefercloud/briefer:latest");
        assert_eq!(normalize_image("briefercloud/briefer:v0.1"), "briefercloud/briefer:v0.1");
        assert_eq!(normalize_image("briefer"), "briefer");
        assert_eq!(normalize_image("briefer:dev"), "briefer:dev");
    }

    #[test]
    fn test_should_pull() {
        assert!(should_pull("briefercloud/briefer:latest", true));
        assert!(!should_pull("briefercloud/briefer:v0.1", true));
        assert!(should_pull("briefercloud/briefer:v0.1", false));
        assert!(!should_pull("briefer:latest", true));
        assert!(should_pull("briefer", false));
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("\n").unwrap(), ExistingAction::Leave);
        assert_eq!(parse_action("stop\n").unwrap(), ExistingAction::Stop);
        assert_eq!(parse_action("  restart ").unwrap(), ExistingAction::Restart);
        assert!(matches!(parse_action("nuke"), Err(ContainerError::InvalidAction(_))));
    }

    #[test]
    fn test_forwarded_env_only_known_and_set() {
        let host: HashMap<&str, &str> = [("LOG_LEVEL", "debug"), ("HOME", "/root"), ("JUPYTER_TOKEN", "t")]
            .into_iter()
            .collect();

        let env = forwarded_env(|key| host.get(key).map(|v| v.to_string()));
        assert_eq!(
            env,
            vec![
                ("LOG_LEVEL".to_string(), "debug".to_string()),
                ("JUPYTER_TOKEN".to_string(), "t".to_string()),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_container_removed_even_if_stop_fails() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let script = dir.path().join("docker");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" >> {}\n[ \"$1\" = stop ] && exit 1\nexit 0\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let docker = DockerCli::new(script.to_string_lossy());
        remove_stale_container(&docker, "briefer").await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            vec!["container inspect briefer", "stop briefer", "rm briefer"]
        );
    }

    #[test]
    fn test_find_free_port_skips_bound() {
        let listener = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let taken = listener.local_addr().unwrap().port();

        let port = find_free_port(taken).unwrap();
        assert!(port > taken);
    }
}
