use crate::keys::validate_key;
use crate::traits::{ObjectMetadata, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Objects are plain files under `base_path`. The filesystem has no place for object
/// metadata, so it is only logged.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for object storage (e.g., "/var/lib/reelgate/media")
    /// * `base_url` - Base URL for serving objects (e.g., "http://localhost:4000/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with traversal validation
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write into a sibling temp file and rename, so readers never see partial objects.
    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        path.with_file_name(name)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload_bytes(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;
        let staging = Self::staging_path(&path);
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&staging).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;
        fs::rename(&staging, &path).await?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            content_type = %content_type,
            metadata = ?metadata,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(())
    }

    async fn upload_file(
        &self,
        source: &Path,
        key: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;
        let staging = Self::staging_path(&path);
        let start = std::time::Instant::now();

        let size = fs::copy(source, &staging).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to copy {} to {}: {}",
                source.display(),
                path.display(),
                e
            ))
        })?;
        fs::rename(&staging, &path).await?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            content_type = %content_type,
            metadata = ?metadata,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage file upload successful"
        );

        Ok(size)
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::DownloadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage(dir: &TempDir) -> LocalStorage {
        LocalStorage::new(dir.path().join("objects"), "http://localhost:4000/media/".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_storage_upload_download() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        storage
            .upload_bytes(
                "videos/a/thumbnail.jpg",
                Bytes::from_static(b"jpeg"),
                "image/jpeg",
                &ObjectMetadata::new(),
            )
            .await
            .unwrap();

        let data = storage.download("videos/a/thumbnail.jpg").await.unwrap();
        assert_eq!(&data[..], b"jpeg");
        assert!(storage.exists("videos/a/thumbnail.jpg").await.unwrap());
        assert_eq!(
            storage.object_url("videos/a/thumbnail.jpg"),
            "http://localhost:4000/media/videos/a/thumbnail.jpg"
        );
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        let result = storage
            .upload_bytes(
                "../escape.txt",
                Bytes::from_static(b"x"),
                "text/plain",
                &ObjectMetadata::new(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        storage.delete("videos/none").await.unwrap();
        assert!(matches!(
            storage.download("videos/none").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_file_streams_copy() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;
        let source = dir.path().join("clip.mp4");
        tokio::fs::write(&source, vec![7u8; 4096]).await.unwrap();

        let size = storage
            .upload_file(&source, "videos/a/original/clip.mp4", "video/mp4", &ObjectMetadata::new())
            .await
            .unwrap();

        assert_eq!(size, 4096);
        assert_eq!(storage.download("videos/a/original/clip.mp4").await.unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_upload_directory_keeps_relative_layout() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;
        let hls = dir.path().join("hls");
        tokio::fs::create_dir_all(hls.join("360p")).await.unwrap();
        tokio::fs::write(hls.join("master.m3u8"), b"#EXTM3U\n").await.unwrap();
        tokio::fs::write(hls.join("360p/playlist.m3u8"), b"#EXTM3U\n").await.unwrap();
        tokio::fs::write(hls.join("360p/segment_000.ts"), b"ts").await.unwrap();

        let objects = storage.upload_directory(&hls, "videos/a/hls/").await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();

        assert_eq!(
            keys,
            vec![
                "videos/a/hls/360p/playlist.m3u8",
                "videos/a/hls/360p/segment_000.ts",
                "videos/a/hls/master.m3u8",
            ]
        );
        assert!(storage.exists("videos/a/hls/360p/segment_000.ts").await.unwrap());
    }

    #[tokio::test]
    async fn test_public_url_uses_request_host_for_loopback() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        assert_eq!(
            storage.public_url("videos/a/hls/master.m3u8", Some("tv.example.com")),
            "http://tv.example.com:4000/media/videos/a/hls/master.m3u8"
        );
    }
}
