use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Stat snapshot of a single filesystem entry, serialized per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    /// Seconds since the UNIX epoch, fractional.
    pub modified: f64,
    /// Inode change time on unix, creation time elsewhere.
    pub created: f64,
    pub mime_type: Option<String>,
    pub is_directory: bool,
}

impl FileInfo {
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Self {
            name,
            path: path.to_string_lossy().into_owned(),
            size: metadata.len(),
            modified: metadata.modified().map(system_time_seconds).unwrap_or(0.0),
            created: created_seconds(metadata),
            mime_type: mime_guess::from_path(path).first_raw().map(str::to_string),
            is_directory: metadata.is_dir(),
        }
    }
}

fn system_time_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(unix)]
fn created_seconds(metadata: &Metadata) -> f64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ctime() as f64 + metadata.ctime_nsec() as f64 / 1_000_000_000.0
}

#[cfg(not(unix))]
fn created_seconds(metadata: &Metadata) -> f64 {
    metadata.created().map(system_time_seconds).unwrap_or(0.0)
}

/// Failures reported to bridge clients as `{"reason": ...}`.
#[derive(Error, Debug)]
pub enum FileBridgeError {
    #[error("path does not exist")]
    NotFound,

    #[error("path is a directory")]
    IsDirectory,

    #[error("path is not a directory")]
    NotDirectory,

    #[error("no file path given")]
    PathNotSpecified,

    #[error("request carried no data")]
    NoData,

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileBridgeError {
    pub fn reason(&self) -> &'static str {
        match self {
            FileBridgeError::NotFound => "not-found",
            FileBridgeError::IsDirectory => "is-directory",
            FileBridgeError::NotDirectory => "not-directory",
            FileBridgeError::PathNotSpecified => "file-path-not-specified",
            FileBridgeError::NoData => "no-data",
            FileBridgeError::Body(_) => "invalid-body",
            FileBridgeError::Io(_) => "io-error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FileBridgeError::NotFound => StatusCode::NOT_FOUND,
            FileBridgeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for FileBridgeError {
    fn into_response(self) -> Response {
        if let FileBridgeError::Io(err) = &self {
            tracing::error!("File bridge IO error: {:?}", err);
        }
        (self.status(), Json(json!({ "reason": self.reason() }))).into_response()
    }
}
