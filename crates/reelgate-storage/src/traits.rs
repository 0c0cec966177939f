//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::mime::content_type_for;
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use reelgate_core::AppError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// User metadata attached to an object (`owner-id`, `original-filename`, ...)
pub type ObjectMetadata = BTreeMap<String, String>;

/// An object written by a directory upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: u64,
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other => AppError::StorageUploadFailed(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) implement this trait. Keys use `/` as
/// separator and must not contain `..` or start with `/`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload an in-memory object to `key`
    async fn upload_bytes(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<()>;

    /// Stream a local file to `key` without loading it in memory.
    /// Returns the number of bytes written.
    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<u64>;

    /// Download an object by its key
    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// URL of the object as configured for the backend
    fn object_url(&self, key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Recursively upload every file under `dir` to `{prefix}/{relative/path}`.
    ///
    /// Content types are derived from file extensions. Objects are returned in key order.
    async fn upload_directory(&self, dir: &Path, prefix: &str) -> StorageResult<Vec<StoredObject>> {
        let files = list_files(dir.to_path_buf()).await?;
        let prefix = prefix.trim_end_matches('/');
        let no_metadata = ObjectMetadata::new();

        let mut uploaded = Vec::with_capacity(files.len());
        for (path, relative) in files {
            let key = format!("{}/{}", prefix, relative);
            let size_bytes = self
                .upload_file(&path, &key, content_type_for(&path), &no_metadata)
                .await?;
            uploaded.push(StoredObject { key, size_bytes });
        }

        tracing::debug!(
            prefix = %prefix,
            object_count = uploaded.len(),
            "Directory upload finished"
        );

        Ok(uploaded)
    }

    /// Delete several objects, stopping at the first failure
    async fn delete_many(&self, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Public URL of an object.
    ///
    /// When the configured URL points at a loopback host and the host of the current
    /// request is known, the request's host name replaces it (scheme and port are kept).
    fn public_url(&self, key: &str, request_host: Option<&str>) -> String {
        crate::url::substitute_loopback_host(&self.object_url(key), request_host)
    }
}

/// Files under `dir` paired with their `/`-separated relative path, sorted.
async fn list_files(dir: PathBuf) -> StorageResult<Vec<(PathBuf, String)>> {
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| StorageError::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&dir)
                .map_err(|e| StorageError::InvalidKey(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push((entry.path().to_path_buf(), relative));
        }
        Ok(files)
    })
    .await
    .map_err(|e| StorageError::BackendError(format!("Directory walk task failed: {}", e)))?
}
