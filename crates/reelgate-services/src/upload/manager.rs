//! Resumable chunked uploads: session admission, chunk intake, reassembly and hand-off
//! of the original file to object storage.

use bytes::Bytes;
use chrono::Utc;
use reelgate_core::constants::{
    ANONYMOUS_OWNER, CHUNK_FILE_PREFIX, META_ORIGINAL_FILENAME, META_OWNER_ID,
};
use reelgate_core::filename::{assembled_file_name, sanitize_filename, validate_extension};
use reelgate_core::models::{
    ChunkReceipt, CompletedUpload, ResumeInfo, UploadProgress, UploadSession, VideoAsset,
    VideoMetadata,
};
use reelgate_core::{AppError, UploadConfig};
use reelgate_db::{AssetStateRecorder, SessionStore};
use reelgate_processing::TranscodeEngine;
use reelgate_storage::{keys, mime, ObjectMetadata, Storage};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Upload limits and directories.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub chunk_size: u64,
    pub max_file_size: u64,
    /// Lowercase extensions without the dot
    pub allowed_formats: Vec<String>,
    pub temp_dir: PathBuf,
    pub upload_dir: PathBuf,
}

impl From<&UploadConfig> for UploadSettings {
    fn from(config: &UploadConfig) -> Self {
        Self {
            chunk_size: config.chunk_size_bytes,
            max_file_size: config.max_upload_size_bytes,
            allowed_formats: config.allowed_formats.clone(),
            temp_dir: config.temp_dir.clone(),
            upload_dir: config.upload_dir.clone(),
        }
    }
}

/// Client request to open an upload session.
#[derive(Debug, Clone)]
pub struct InitializeUpload {
    pub filename: String,
    pub declared_size: u64,
    pub mime_type: String,
    pub owner_id: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 128 random bits, hex encoded
fn new_session_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Session ids are exactly 32 lowercase hex characters.
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == 32 && id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

pub fn chunk_file_name(index: u32) -> String {
    format!("{}{:06}", CHUNK_FILE_PREFIX, index)
}

/// Marks a session as being completed; released on drop.
struct CompletionGuard<'a> {
    completing: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> CompletionGuard<'a> {
    fn acquire(completing: &'a Mutex<HashSet<String>>, id: &str) -> Result<Self, AppError> {
        if !lock(completing).insert(id.to_string()) {
            return Err(AppError::Conflict(format!(
                "Upload {} is already being completed or cancelled",
                id
            )));
        }
        Ok(Self {
            completing,
            id: id.to_string(),
        })
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        lock(self.completing).remove(&self.id);
    }
}

pub struct UploadSessionManager {
    sessions: Arc<dyn SessionStore>,
    assets: Arc<dyn AssetStateRecorder>,
    storage: Arc<dyn Storage>,
    engine: Arc<dyn TranscodeEngine>,
    settings: UploadSettings,
    completing: Mutex<HashSet<String>>,
}

impl UploadSessionManager {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        assets: Arc<dyn AssetStateRecorder>,
        storage: Arc<dyn Storage>,
        engine: Arc<dyn TranscodeEngine>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            sessions,
            assets,
            storage,
            engine,
            settings,
            completing: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    async fn load(&self, id: &str) -> Result<UploadSession, AppError> {
        if !is_valid_session_id(id) {
            return Err(AppError::SessionNotFound(id.to_string()));
        }
        self.sessions
            .get(id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// Open a session and register its `uploading` asset.
    ///
    /// Nothing is created when the format or size is rejected.
    #[tracing::instrument(skip(self, request), fields(filename = %request.filename, declared_size = request.declared_size))]
    pub async fn initialize_upload(&self, request: InitializeUpload) -> Result<UploadSession, AppError> {
        validate_extension(&request.filename, &self.settings.allowed_formats)?;

        if request.declared_size > self.settings.max_file_size {
            return Err(AppError::FileTooLarge {
                size: request.declared_size,
                max: self.settings.max_file_size,
            });
        }

        let owner_id = request
            .owner_id
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| ANONYMOUS_OWNER.to_string());

        let id = new_session_id();
        let scratch_dir = self.settings.temp_dir.join(&id);
        tokio::fs::create_dir_all(&scratch_dir).await?;

        let asset = VideoAsset::new_uploading(owner_id.clone(), request.filename.clone());
        if let Err(e) = self.assets.create_asset(&asset).await {
            remove_scratch_dir(&scratch_dir).await;
            return Err(e);
        }

        let now = Utc::now();
        let session = UploadSession {
            id,
            asset_id: asset.id,
            original_filename: request.filename,
            declared_size: request.declared_size,
            mime_type: request.mime_type,
            owner_id,
            chunk_size: self.settings.chunk_size,
            total_chunks: UploadSession::total_chunks_for(
                request.declared_size,
                self.settings.chunk_size,
            ),
            received_chunks: BTreeSet::new(),
            scratch_dir,
            created_at: now,
            last_activity_at: now,
        };

        if let Err(e) = self.sessions.insert(&session).await {
            remove_scratch_dir(&session.scratch_dir).await;
            if let Err(discard_err) = self.assets.discard_uploading(asset.id).await {
                tracing::warn!(asset_id = %asset.id, error = %discard_err, "Failed to discard asset");
            }
            return Err(e);
        }

        tracing::info!(
            upload_id = %session.id,
            asset_id = %session.asset_id,
            total_chunks = session.total_chunks,
            "Upload session initialized"
        );

        Ok(session)
    }

    /// Store one chunk. A retried index replaces the earlier bytes.
    #[tracing::instrument(skip(self, data), fields(upload_id = %id, chunk_index = index, chunk_len = data.len()))]
    pub async fn upload_chunk(&self, id: &str, index: u32, data: Bytes) -> Result<ChunkReceipt, AppError> {
        let session = self.load(id).await?;

        if !session.contains_index(index) {
            return Err(AppError::InvalidChunkIndex {
                index,
                total: session.total_chunks,
            });
        }
        if data.len() as u64 > session.chunk_size {
            return Err(AppError::InvalidInput(format!(
                "Chunk of {} bytes exceeds the chunk size of {} bytes",
                data.len(),
                session.chunk_size
            )));
        }

        let final_path = session.scratch_dir.join(chunk_file_name(index));
        let temp_path = session
            .scratch_dir
            .join(format!(".{}.{}.tmp", chunk_file_name(index), Uuid::new_v4()));

        if let Err(e) = write_file(&temp_path, &data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        let updated = self
            .sessions
            .record_chunk(id, index)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;

        tracing::debug!(
            uploaded = updated.uploaded_count(),
            total = updated.total_chunks,
            "Chunk stored"
        );

        Ok(updated.receipt())
    }

    /// Reassemble the chunks, probe the result and upload it as the asset's original.
    ///
    /// The session is only deleted once the original is in object storage; any earlier
    /// failure leaves it intact so `complete` can be retried.
    #[tracing::instrument(skip(self), fields(upload_id = %id))]
    pub async fn complete_upload(&self, id: &str) -> Result<CompletedUpload, AppError> {
        let _guard = CompletionGuard::acquire(&self.completing, id)?;
        let start = std::time::Instant::now();
        let session = self.load(id).await?;

        if !session.is_complete() {
            return Err(AppError::IncompleteUpload {
                received: session.uploaded_count(),
                total: session.total_chunks,
            });
        }

        tokio::fs::create_dir_all(&self.settings.upload_dir).await?;
        let file_name = assembled_file_name(&session.original_filename, Utc::now().timestamp_millis());
        let file_path = self.settings.upload_dir.join(&file_name);

        let (storage_key, metadata) = match self.assemble_and_store(&session, &file_path, &file_name).await {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&file_path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %file_path.display(),
                            error = %remove_err,
                            "Failed to remove partial assembled file"
                        );
                    }
                }
                return Err(e);
            }
        };

        self.sessions.delete(&session.id).await?;
        remove_scratch_dir(&session.scratch_dir).await;

        tracing::info!(
            asset_id = %session.asset_id,
            storage_key = %storage_key,
            size_bytes = session.declared_size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload completed"
        );

        Ok(CompletedUpload {
            asset_id: session.asset_id,
            owner_id: session.owner_id,
            file_path,
            storage_key,
            metadata,
        })
    }

    async fn assemble_and_store(
        &self,
        session: &UploadSession,
        file_path: &Path,
        file_name: &str,
    ) -> Result<(String, Option<VideoMetadata>), AppError> {
        let written = assemble_chunks(session, file_path).await?;
        if written > session.declared_size {
            return Err(AppError::InvalidInput(format!(
                "Assembled {} bytes but {} were declared",
                written, session.declared_size
            )));
        }

        let metadata = match self.engine.probe_metadata(file_path).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(error = %e, "Probe after reassembly failed, continuing without metadata");
                None
            }
        };

        let storage_key = keys::original_key(session.asset_id, file_name);
        let mut object_metadata = ObjectMetadata::new();
        object_metadata.insert(META_OWNER_ID.to_string(), session.owner_id.clone());
        object_metadata.insert(
            META_ORIGINAL_FILENAME.to_string(),
            sanitize_filename(&session.original_filename),
        );

        self.storage
            .upload_file(
                file_path,
                &storage_key,
                mime::content_type_for(file_path),
                &object_metadata,
            )
            .await?;

        Ok((storage_key, metadata))
    }

    /// Drop a session, its chunks and its still-`uploading` asset. Unknown ids are a no-op;
    /// a session being completed is a `Conflict`.
    #[tracing::instrument(skip(self), fields(upload_id = %id))]
    pub async fn cancel_upload(&self, id: &str) -> Result<(), AppError> {
        if !is_valid_session_id(id) {
            return Ok(());
        }
        // A completion in flight owns the scratch dir until it finishes
        let _guard = CompletionGuard::acquire(&self.completing, id)?;
        let Some(session) = self.sessions.get(id).await? else {
            return Ok(());
        };

        self.sessions.delete(id).await?;
        if let Err(e) = self.assets.discard_uploading(session.asset_id).await {
            tracing::warn!(asset_id = %session.asset_id, error = %e, "Failed to discard asset of cancelled upload");
        }
        remove_scratch_dir(&session.scratch_dir).await;

        tracing::info!(asset_id = %session.asset_id, "Upload cancelled");
        Ok(())
    }

    pub async fn get_upload_progress(&self, id: &str) -> Result<UploadProgress, AppError> {
        Ok(self.load(id).await?.progress())
    }

    /// Chunks already received, so a client can send only the missing ones.
    pub async fn resume_upload(&self, id: &str) -> Result<ResumeInfo, AppError> {
        let session = self.load(id).await?;
        self.sessions.touch(id).await?;
        Ok(session.resume_info())
    }

    /// Cancel every session idle for longer than `timeout`; returns how many were removed.
    pub async fn sweep_abandoned(&self, timeout: std::time::Duration) -> Result<usize, AppError> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| AppError::InvalidInput(format!("Invalid session timeout: {}", e)))?;
        let stale = self.sessions.list_inactive(Utc::now() - timeout).await?;

        let mut removed = 0;
        for session in stale {
            match self.cancel_upload(&session.id).await {
                Ok(()) => removed += 1,
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(upload_id = %session.id, "Idle upload is being completed, skipping");
                }
                Err(e) => {
                    tracing::warn!(upload_id = %session.id, error = %e, "Failed to remove abandoned upload");
                }
            }
        }
        Ok(removed)
    }
}

async fn write_file(path: &Path, data: &[u8]) -> Result<(), AppError> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// Concatenate `chunk_000000..chunk_{total-1}` into `target`; returns the byte count.
async fn assemble_chunks(session: &UploadSession, target: &Path) -> Result<u64, AppError> {
    let mut output = tokio::fs::File::create(target).await?;
    let mut written = 0u64;

    for index in 0..session.total_chunks {
        let chunk_path = session.scratch_dir.join(chunk_file_name(index));
        let mut chunk = tokio::fs::File::open(&chunk_path).await.map_err(|e| {
            AppError::Internal(format!("Chunk {} missing from scratch dir: {}", index, e))
        })?;
        written += tokio::io::copy(&mut chunk, &mut output).await?;
        if written > session.declared_size {
            break;
        }
    }

    output.flush().await?;
    output.sync_all().await?;
    Ok(written)
}

async fn remove_scratch_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to remove upload scratch dir");
        }
    }
}
