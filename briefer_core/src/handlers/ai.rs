//! Prompt-chain endpoints of the AI API.

use crate::{
    ai::{
        chains, stream_json_lines, JsonObject, PythonEditRequest, SqlEditRequest,
        TextToSqlRequest, VannaRequest, VegaRequest,
    },
    error::Result,
    AppState,
};
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use std::convert::Infallible;
use tracing::info;

pub async fn ping() -> &'static str {
    "pong"
}

/// Wraps a stream of JSON lines in a `text/plain` response.
async fn streaming_response(
    state: &AppState,
    model_id: Option<&str>,
    api_key: Option<&str>,
    prompt: String,
) -> Result<Response> {
    let provider = state.models.resolve(model_id, api_key)?;
    let lines = stream_json_lines(provider, prompt).await?;
    let body = Body::from_stream(lines.map(Ok::<_, Infallible>));

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

pub async fn stream_sql_edit(
    State(state): State<AppState>,
    Json(req): Json<SqlEditRequest>,
) -> Result<Response> {
    info!(dialect = %req.dialect, "POST /v1/stream/sql/edit");
    let prompt = chains::sql_edit_stream_prompt(&req);
    streaming_response(&state, req.model_id.as_deref(), req.openai_api_key.as_deref(), prompt).await
}

pub async fn stream_python_edit(
    State(state): State<AppState>,
    Json(req): Json<PythonEditRequest>,
) -> Result<Response> {
    info!(libraries = req.allowed_libraries.len(), "POST /v1/stream/python/edit");
    let prompt = chains::python_edit_stream_prompt(&req);
    streaming_response(&state, req.model_id.as_deref(), req.openai_api_key.as_deref(), prompt).await
}

pub async fn sql_edit(
    State(state): State<AppState>,
    Json(req): Json<SqlEditRequest>,
) -> Result<Json<JsonObject>> {
    info!(dialect = %req.dialect, "POST /v1/sql/edit");
    let provider = state
        .models
        .resolve(req.model_id.as_deref(), req.openai_api_key.as_deref())?;
    Ok(Json(chains::sql_edit(provider, &req).await?))
}

pub async fn python_edit(
    State(state): State<AppState>,
    Json(req): Json<PythonEditRequest>,
) -> Result<Json<JsonObject>> {
    info!("POST /v1/python/edit");
    let provider = state
        .models
        .resolve(req.model_id.as_deref(), req.openai_api_key.as_deref())?;
    Ok(Json(chains::python_edit(provider, &req).await?))
}

pub async fn text_to_sql(
    State(state): State<AppState>,
    Json(req): Json<TextToSqlRequest>,
) -> Result<Json<JsonObject>> {
    info!(dialect = %req.dialect, "POST /v1/sql");
    let provider = state
        .models
        .resolve(req.model_id.as_deref(), req.openai_api_key.as_deref())?;
    Ok(Json(chains::text_to_sql(provider, &req).await?))
}

pub async fn vega(
    State(state): State<AppState>,
    Json(req): Json<VegaRequest>,
) -> Result<Json<JsonObject>> {
    info!("POST /v1/vega");
    let provider = state
        .models
        .resolve(req.model_id.as_deref(), req.openai_api_key.as_deref())?;
    Ok(Json(chains::vega_spec(provider, &req).await?))
}

pub async fn vanna(
    State(state): State<AppState>,
    Json(req): Json<VannaRequest>,
) -> Result<Json<JsonObject>> {
    info!("POST /v1/vanna");
    let provider = state
        .models
        .resolve(req.model_id.as_deref(), req.openai_api_key.as_deref())?;
    Ok(Json(chains::question_to_sql(provider, &req).await?))
}
