//! Tracing subscriber setup shared by every binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. `crate_name` scopes the default filter to the
/// calling binary; `RUST_LOG` overrides it and `LOG_FORMAT=json` switches to JSON.
pub fn init_tracing(crate_name: &str) {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
    init_tracing_with_level(crate_name, default_level);
}

/// Like [`init_tracing`] with an explicit default level for our own crates.
pub fn init_tracing_with_level(crate_name: &str, default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={level},briefer_core={level},tower_http={level},axum={level}",
            crate_name.replace('-', "_"),
            level = default_level
        )
        .into()
    });

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let is_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    // A second call (tests, embedded use) keeps the first subscriber.
    let result = if is_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("Tracing already initialised: {}", e);
    }
}
