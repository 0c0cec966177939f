//! Repository traits shared by the PostgreSQL and in-memory implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelgate_core::models::{
    AssetOutputs, JobStatus, TranscodeJob, UploadSession, VideoAsset, VideoMetadata,
};
use reelgate_core::AppError;
use uuid::Uuid;

/// Durable status, progress and output record of video assets.
///
/// Writes to an asset that does not exist fail with `AppError::NotFound`. `ready` and `error`
/// are final: status and progress writes only apply to an asset in the state they move
/// from, and return whether the asset was updated.
#[async_trait]
pub trait AssetStateRecorder: Send + Sync {
    async fn create_asset(&self, asset: &VideoAsset) -> Result<(), AppError>;

    async fn get_asset(&self, id: Uuid) -> Result<Option<VideoAsset>, AppError>;

    /// `uploading → processing` once the reassembled original is in object storage
    async fn mark_processing(
        &self,
        id: Uuid,
        original_path: &str,
        metadata: Option<&VideoMetadata>,
    ) -> Result<bool, AppError>;

    async fn record_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<(), AppError>;

    /// Only while `processing`
    async fn update_progress(&self, id: Uuid, progress: u8) -> Result<bool, AppError>;

    /// `processing → ready` with progress 100 and the output locations
    async fn mark_ready(&self, id: Uuid, outputs: &AssetOutputs) -> Result<bool, AppError>;

    /// Sets status `error` with a message unless the asset is already `ready` or `error`
    async fn mark_error(&self, id: Uuid, message: &str) -> Result<bool, AppError>;

    /// Delete an asset that never left `uploading`; returns whether a row was removed
    async fn discard_uploading(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Durable upload session metadata. Chunk bytes live on local disk.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &UploadSession) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<UploadSession>, AppError>;

    /// Atomically add `index` to the received set and bump `last_activity_at`.
    /// Returns the updated session, or `None` when the session does not exist.
    async fn record_chunk(&self, id: &str, index: u32) -> Result<Option<UploadSession>, AppError>;

    /// Bump `last_activity_at` without changing anything else
    async fn touch(&self, id: &str) -> Result<(), AppError>;

    /// Returns whether a session was removed
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Sessions whose last activity is older than `before`
    async fn list_inactive(&self, before: DateTime<Utc>) -> Result<Vec<UploadSession>, AppError>;
}

/// Durable transcode job records.
#[async_trait]
pub trait TranscodeJobRepository: Send + Sync {
    async fn insert(&self, job: &TranscodeJob) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<TranscodeJob>, AppError>;

    /// `queued → running`; returns false when the job is no longer queued
    async fn mark_running(&self, id: Uuid) -> Result<bool, AppError>;

    async fn heartbeat(&self, id: Uuid) -> Result<(), AppError>;

    /// Move an unfinished job to a final status; returns false when it was already finished
    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<TranscodeJob>, AppError>;

    /// Running jobs whose last heartbeat (or start) is older than `before`
    async fn find_stale_running(&self, before: DateTime<Utc>)
        -> Result<Vec<TranscodeJob>, AppError>;

    /// Most recent job of an asset
    async fn latest_for_asset(&self, asset_id: Uuid) -> Result<Option<TranscodeJob>, AppError>;
}
