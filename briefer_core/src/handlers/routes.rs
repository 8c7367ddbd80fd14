//! Route tables for the AI API and the notebook file bridge

use crate::{
    handlers::{ai, files},
    middleware::auth::{basic_auth_middleware, token_auth_middleware},
    AppState,
};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

pub fn create_ai_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/v1/stream/sql/edit", post(ai::stream_sql_edit))
        .route("/v1/stream/python/edit", post(ai::stream_python_edit))
        .route("/v1/sql/edit", post(ai::sql_edit))
        .route("/v1/python/edit", post(ai::python_edit))
        .route("/v1/sql", post(ai::text_to_sql))
        .route("/v1/vega", post(ai::vega))
        .route("/v1/vanna", post(ai::vanna))
        .route_layer(middleware::from_fn_with_state(state, basic_auth_middleware));

    Router::new().route("/ping", get(ai::ping)).merge(protected)
}

/// Mount point of the bridge routes for a notebook host served under `base_url`.
pub fn bridge_prefix(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = base.trim_start_matches('/');
    if base.is_empty() {
        "/api/briefer".to_string()
    } else {
        format!("/{}/api/briefer", base)
    }
}

pub fn create_bridge_routes(state: AppState) -> Router<AppState> {
    let prefix = bridge_prefix(&state.config.bridge.base_url);

    let bridge = Router::new()
        .route("/files/list", get(files::list_files))
        .route("/files/stat", get(files::stat_file))
        .route("/files/read", get(files::read_file))
        .route("/files/write", post(files::write_file))
        .route("/files/remove", delete(files::remove_file))
        .route("/ping", get(ai::ping))
        .route("/cwd", get(files::cwd))
        .route_layer(middleware::from_fn_with_state(state, token_auth_middleware));

    Router::new().nest(&prefix, bridge)
}
