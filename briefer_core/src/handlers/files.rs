//! Notebook file-bridge endpoints.

use crate::{
    error::Result,
    files::{bridge, FileInfo, CHUNK_SIZE},
};
use axum::{
    body::Body,
    extract::Query,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirQuery {
    dir_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileQuery {
    file_path: Option<String>,
}

pub async fn list_files(Query(params): Query<DirQuery>) -> Result<Json<Vec<FileInfo>>> {
    debug!("GET files/list - dirPath: {:?}", params.dir_path);
    Ok(Json(bridge::list_directory(params.dir_path.as_deref()).await?))
}

pub async fn stat_file(Query(params): Query<FileQuery>) -> Result<Json<FileInfo>> {
    debug!("GET files/stat - filePath: {:?}", params.file_path);
    Ok(Json(bridge::stat_file(params.file_path.as_deref()).await?))
}

pub async fn read_file(Query(params): Query<FileQuery>) -> Result<Response> {
    let (info, file) = bridge::open_file(params.file_path.as_deref()).await?;
    info!("Streaming {} ({} bytes)", info.path, info.size);

    let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));
    let disposition = format!("attachment; filename=\"{}\"", info.name.replace('"', "\\\""));

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, info.size.to_string()),
        ],
        body,
    )
        .into_response())
}

pub async fn write_file(Query(params): Query<FileQuery>, body: Body) -> Result<Json<FileInfo>> {
    debug!("POST files/write - filePath: {:?}", params.file_path);
    Ok(Json(bridge::write_file(params.file_path.as_deref(), body.into_data_stream()).await?))
}

pub async fn remove_file(Query(params): Query<FileQuery>) -> Result<Json<FileInfo>> {
    debug!("DELETE files/remove - filePath: {:?}", params.file_path);
    Ok(Json(bridge::remove_file(params.file_path.as_deref()).await?))
}

pub async fn cwd() -> Result<impl IntoResponse> {
    Ok(Json(json!({ "cwd": bridge::current_dir()? })))
}
