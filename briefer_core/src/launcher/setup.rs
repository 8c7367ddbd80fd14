//! One-shot container setup: secrets, database password, migrations and the
//! per-user config files the launchers wait for.

use rand::RngCore;
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use super::config::{ConfigPaths, LauncherConfig, POLL_INTERVAL};
use super::process::{current_env, merge_defaults, ChildCommand, EnvMap};
use super::LaunchError;

pub const MIGRATIONS_WORKDIR: &str = "/app/api/";
pub const PRISMA_SCHEMA: &str = "packages/database/prisma/schema.prisma";

/// The two config directories setup prepares and who owns them.
#[derive(Debug, Clone)]
pub struct SetupLayout {
    pub apps: ConfigPaths,
    pub apps_user: String,
    pub jupyter: ConfigPaths,
    pub jupyter_user: String,
}

impl Default for SetupLayout {
    fn default() -> Self {
        Self {
            apps: ConfigPaths::for_home("/home/briefer"),
            apps_user: "briefer".to_string(),
            jupyter: ConfigPaths::for_home("/home/jupyteruser"),
            jupyter_user: "jupyteruser".to_string(),
        }
    }
}

impl SetupLayout {
    fn entries(&self) -> [(&ConfigPaths, &str); 2] {
        [(&self.apps, &self.apps_user), (&self.jupyter, &self.jupyter_user)]
    }
}

/// Hex encoding of `size` random bytes.
pub fn random_secret(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Builds the apps config for a first run. Values present in `env` replace the
/// generated ones.
pub fn generate_apps_config(env: &EnvMap) -> Map<String, Value> {
    let tld = env.get("TLD").cloned().unwrap_or_else(|| "localhost".to_string());
    let (api_url, frontend_url) = if tld == "localhost" {
        ("http://localhost:8080".to_string(), "http://localhost:3000".to_string())
    } else {
        (format!("https://api.{}", tld), format!("https://app.{}", tld))
    };

    let generated = [
        ("NODE_ENV", "production".to_string()),
        ("LOG_LEVEL", "info".to_string()),
        ("TLD", tld),
        ("API_URL", api_url),
        ("FRONTEND_URL", frontend_url),
        ("POSTGRES_USERNAME", "briefer".to_string()),
        ("POSTGRES_PASSWORD", random_secret(8)),
        ("JUPYTER_TOKEN", random_secret(32)),
        ("AI_BASIC_AUTH_USERNAME", random_secret(8)),
        ("AI_BASIC_AUTH_PASSWORD", random_secret(8)),
        ("LOGIN_JWT_SECRET", random_secret(32)),
        ("AUTH_JWT_SECRET", random_secret(32)),
        ("ENVIRONMENT_VARIABLES_ENCRYPTION_KEY", random_secret(32)),
        ("DATASOURCES_ENCRYPTION_KEY", random_secret(32)),
        ("WORKSPACE_SECRETS_ENCRYPTION_KEY", random_secret(32)),
    ];

    generated
        .into_iter()
        .map(|(key, value)| {
            let value = env.get(key).cloned().unwrap_or(value);
            (key.to_string(), Value::String(value))
        })
        .collect()
}

/// Writes `values` as 4-space indented JSON, owned by `owner`, mode 0700.
pub async fn write_config(
    path: &Path,
    values: &Map<String, Value>,
    owner: Option<&str>,
) -> Result<(), LaunchError> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    values.serialize(&mut serializer)?;

    fs::write(path, &buf).await?;
    if let Some(user) = owner {
        chown_to(path, user)?;
    }
    set_mode(path, 0o700).await?;
    Ok(())
}

/// Reads a numeric id (third field) for `name` from a passwd/group style file.
pub fn parse_id(contents: &str, name: &str) -> Option<u32> {
    contents
        .lines()
        .map(|line| line.split(':').collect::<Vec<_>>())
        .find(|fields| fields.first() == Some(&name))
        .and_then(|fields| fields.get(2)?.parse().ok())
}

fn lookup_owner(user: &str) -> Result<(u32, u32), LaunchError> {
    let passwd = std::fs::read_to_string("/etc/passwd")?;
    let group = std::fs::read_to_string("/etc/group")?;

    let uid = parse_id(&passwd, user).ok_or_else(|| LaunchError::UnknownUser(user.to_string()))?;
    let gid = parse_id(&group, user).ok_or_else(|| LaunchError::UnknownUser(user.to_string()))?;
    Ok((uid, gid))
}

#[cfg(unix)]
fn chown_to(path: &Path, user: &str) -> Result<(), LaunchError> {
    match lookup_owner(user) {
        Ok((uid, gid)) => {
            std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
            Ok(())
        }
        Err(LaunchError::UnknownUser(name)) => {
            warn!("User {} not found, leaving {} owned by the current user", name, path.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn chown_to(_path: &Path, _user: &str) -> Result<(), LaunchError> {
    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), LaunchError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), LaunchError> {
    Ok(())
}

/// Creates the config dirs and drops a sentinel into each so launchers wait.
pub async fn touch_sentinels(layout: &SetupLayout) -> Result<(), LaunchError> {
    for (paths, user) in layout.entries() {
        fs::create_dir_all(&paths.dir).await?;
        fs::write(&paths.sentinel, b"").await?;
        chown_to(&paths.sentinel, user)?;
    }
    Ok(())
}

pub async fn remove_sentinels(layout: &SetupLayout) -> Result<(), LaunchError> {
    for (paths, _) in layout.entries() {
        fs::remove_file(&paths.sentinel).await?;
    }
    Ok(())
}

/// Loads the apps config, generating and persisting it on first run.
pub async fn load_or_generate_apps_config(
    layout: &SetupLayout,
    env: &EnvMap,
) -> Result<LauncherConfig, LaunchError> {
    if fs::try_exists(&layout.apps.config_file).await? {
        info!("Apps config exists, loading");
        return LauncherConfig::load(&layout.apps.config_file).await;
    }

    info!("First run, generating apps config");
    let values = generate_apps_config(env);
    write_config(&layout.apps.config_file, &values, Some(&layout.apps_user)).await?;
    Ok(LauncherConfig::from_map(values))
}

/// Connection to the bundled database with its well-known bootstrap credentials.
fn bootstrap_options() -> PgConnectOptions {
    PgConnectOptions::new()
        .host("localhost")
        .port(5432)
        .username("briefer")
        .password("briefer")
}

async fn wait_for_postgres(options: &PgConnectOptions) -> PgConnection {
    loop {
        match PgConnection::connect_with(options).await {
            Ok(conn) => return conn,
            Err(e) => {
                info!("Waiting for postgres to be ready: {}", e);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

/// `ALTER USER` takes no bind parameters, so the literal is quoted by hand.
pub fn alter_password_statement(user: &str, password: &str) -> String {
    format!(
        "ALTER USER \"{}\" WITH PASSWORD '{}'",
        user.replace('"', "\"\""),
        password.replace('\'', "''")
    )
}

async fn change_default_password(password: &str) -> Result<(), LaunchError> {
    let mut conn = wait_for_postgres(&bootstrap_options()).await;
    info!("Postgres is ready, changing default user password");

    sqlx::query(&alter_password_statement("briefer", password))
        .execute(&mut conn)
        .await?;
    conn.close().await?;

    info!("Password changed");
    Ok(())
}

pub fn migrations_command(cfg: &LauncherConfig, mut env: EnvMap) -> Result<ChildCommand, LaunchError> {
    let username = cfg.require("POSTGRES_USERNAME")?;
    let password = cfg.require("POSTGRES_PASSWORD")?;

    merge_defaults(
        &mut env,
        [
            ("NODE_ENV", "production".to_string()),
            (
                "POSTGRES_PRISMA_URL",
                format!(
                    "postgresql://{}:{}@localhost:5432/briefer?schema=public",
                    username, password
                ),
            ),
        ],
    );

    Ok(ChildCommand::new(
        "npx",
        &["prisma", "migrate", "deploy", "--schema", PRISMA_SCHEMA],
        env,
    )
    .current_dir(MIGRATIONS_WORKDIR))
}

pub async fn write_jupyter_config(layout: &SetupLayout, apps: &LauncherConfig) -> Result<(), LaunchError> {
    let mut values = Map::new();
    values.insert(
        "JUPYTER_TOKEN".to_string(),
        Value::String(apps.require("JUPYTER_TOKEN")?),
    );
    write_config(&layout.jupyter.config_file, &values, Some(&layout.jupyter_user)).await
}

pub async fn run_setup() -> Result<(), LaunchError> {
    run_setup_with(&SetupLayout::default()).await
}

pub async fn run_setup_with(layout: &SetupLayout) -> Result<(), LaunchError> {
    info!("Starting setup");
    let env = current_env();

    touch_sentinels(layout).await?;

    let apps = load_or_generate_apps_config(layout, &env).await?;
    change_default_password(&apps.require("POSTGRES_PASSWORD")?).await?;

    info!("Running migrations");
    migrations_command(&apps, env)?.run().await?;
    info!("Migrations done");

    write_jupyter_config(layout, &apps).await?;
    remove_sentinels(layout).await?;

    info!("Setup finished");
    Ok(())
}
