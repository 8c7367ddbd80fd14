//! Filesystem operations behind the notebook file bridge.
//!
//! Every call works on absolute or process-relative paths exactly as the
//! client sent them. Access control is the token check in front of the router.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::models::{FileBridgeError, FileInfo};

/// Size of each chunk handed between disk and socket.
pub const CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Uploads are flushed to disk once this many unflushed bytes accumulate.
pub const FLUSH_THRESHOLD: usize = 10 * 1024 * 1024;

pub type BridgeResult<T> = std::result::Result<T, FileBridgeError>;

fn require_path(raw: Option<&str>) -> BridgeResult<PathBuf> {
    match raw {
        Some(p) if !p.is_empty() => Ok(PathBuf::from(p)),
        _ => Err(FileBridgeError::PathNotSpecified),
    }
}

async fn existing_file(raw: Option<&str>) -> BridgeResult<(PathBuf, std::fs::Metadata)> {
    let path = require_path(raw)?;
    let metadata = match fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FileBridgeError::NotFound)
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        return Err(FileBridgeError::IsDirectory);
    }

    Ok((path, metadata))
}

pub async fn list_directory(dir_path: Option<&str>) -> BridgeResult<Vec<FileInfo>> {
    let dir = require_path(dir_path)?;

    let is_dir = fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false);
    if !is_dir {
        return Err(FileBridgeError::NotDirectory);
    }

    let mut entries = fs::read_dir(&dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = dir.join(entry.file_name());
        // Follows symlinks like a plain stat; dangling links are skipped.
        match fs::metadata(&path).await {
            Ok(metadata) => files.push(FileInfo::from_metadata(&path, &metadata)),
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

pub async fn stat_file(file_path: Option<&str>) -> BridgeResult<FileInfo> {
    let (path, metadata) = existing_file(file_path).await?;
    Ok(FileInfo::from_metadata(&path, &metadata))
}

/// Opens a regular file for streaming; the caller owns chunking.
pub async fn open_file(file_path: Option<&str>) -> BridgeResult<(FileInfo, fs::File)> {
    let (path, metadata) = existing_file(file_path).await?;
    let file = fs::File::open(&path).await?;
    Ok((FileInfo::from_metadata(&path, &metadata), file))
}

/// Writes a streamed upload to `file_path`.
///
/// The target is only created once the first non-empty chunk arrives, so an
/// empty upload leaves the filesystem untouched and reports `no-data`.
pub async fn write_file<S, E>(file_path: Option<&str>, body: S) -> BridgeResult<FileInfo>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let path = require_path(file_path)?;

    if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(FileBridgeError::IsDirectory);
    }

    let mut body = std::pin::pin!(body);
    let mut file: Option<fs::File> = None;
    let mut since_flush = 0usize;
    let mut written = 0usize;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FileBridgeError::Body(e.to_string()))?;
        if chunk.is_empty() {
            continue;
        }

        let out = match file {
            Some(ref mut f) => f,
            None => file.insert(fs::File::create(&path).await?),
        };

        out.write_all(&chunk).await?;
        since_flush += chunk.len();
        written += chunk.len();

        if since_flush > FLUSH_THRESHOLD {
            out.flush().await?;
            since_flush = 0;
        }
    }

    let mut file = file.ok_or(FileBridgeError::NoData)?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    info!("Wrote {} bytes to {}", written, path.display());

    let metadata = fs::metadata(&path).await?;
    Ok(FileInfo::from_metadata(&path, &metadata))
}

/// Deletes a regular file, returning its metadata as captured beforehand.
pub async fn remove_file(file_path: Option<&str>) -> BridgeResult<FileInfo> {
    let (path, metadata) = existing_file(file_path).await?;
    let info = FileInfo::from_metadata(&path, &metadata);

    fs::remove_file(&path).await?;
    info!("Removed {}", path.display());

    Ok(info)
}

pub fn current_dir() -> BridgeResult<String> {
    let cwd = std::env::current_dir()?;
    Ok(path_to_string(&cwd))
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn test_list_directory_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let err = list_directory(file.to_str()).await.unwrap_err();
        assert_eq!(err.reason(), "not-directory");

        let err = list_directory(Some("/definitely/not/here")).await.unwrap_err();
        assert_eq!(err.reason(), "not-directory");
    }

    #[tokio::test]
    async fn test_list_directory_reports_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), b"1,2").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let files = list_directory(dir.path().to_str()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a");
        assert!(files[0].is_directory);
        assert_eq!(files[1].name, "b.csv");
        assert_eq!(files[1].size, 3);
        assert_eq!(files[1].mime_type.as_deref(), Some("text/csv"));
        assert!(files[1].path.ends_with("b.csv"));
    }

    #[tokio::test]
    async fn test_stat_missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");

        assert_eq!(stat_file(missing.to_str()).await.unwrap_err().reason(), "not-found");
        assert_eq!(stat_file(dir.path().to_str()).await.unwrap_err().reason(), "is-directory");
        assert_eq!(stat_file(None).await.unwrap_err().reason(), "file-path-not-specified");
    }

    #[tokio::test]
    async fn test_write_then_stat() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");

        let info = write_file(target.to_str(), chunks(vec![b"abc", b"", b"def"]))
            .await
            .unwrap();
        assert_eq!(info.size, 6);
        assert_eq!(std::fs::read(&target).unwrap(), b"abcdef");
        assert_eq!(stat_file(target.to_str()).await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_write_without_data_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("empty.bin");

        let err = write_file(target.to_str(), chunks(vec![])).await.unwrap_err();
        assert_eq!(err.reason(), "no-data");
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_write_rejects_directory_and_missing_path() {
        let dir = tempfile::tempdir().unwrap();

        let err = write_file(dir.path().to_str(), chunks(vec![b"x"])).await.unwrap_err();
        assert_eq!(err.reason(), "is-directory");

        let err = write_file(Some(""), chunks(vec![b"x"])).await.unwrap_err();
        assert_eq!(err.reason(), "file-path-not-specified");
    }

    #[tokio::test]
    async fn test_remove_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.txt");
        std::fs::write(&target, b"bye").unwrap();

        let info = remove_file(target.to_str()).await.unwrap();
        assert_eq!(info.size, 3);
        assert!(!target.exists());

        let err = remove_file(target.to_str()).await.unwrap_err();
        assert_eq!(err.reason(), "not-found");
        assert_eq!(remove_file(dir.path().to_str()).await.unwrap_err().reason(), "is-directory");
    }
}
