//! Hand-off from a completed upload to the transcode queue.

use reelgate_core::constants::PROGRESS_HANDOFF;
use reelgate_core::models::{CompletedUpload, TranscodeOptions, VideoMetadata};
use reelgate_core::AppError;
use reelgate_db::AssetStateRecorder;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::transcode::TranscodeQueue;
use crate::upload::UploadSessionManager;

/// What the client gets back from `complete`; transcoding continues in the background.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub video_id: Uuid,
    pub file_path: PathBuf,
    pub storage_key: String,
    pub metadata: Option<VideoMetadata>,
}

pub struct IngestService {
    uploads: Arc<UploadSessionManager>,
    assets: Arc<dyn AssetStateRecorder>,
    queue: TranscodeQueue,
    defaults: TranscodeOptions,
}

impl IngestService {
    pub fn new(
        uploads: Arc<UploadSessionManager>,
        assets: Arc<dyn AssetStateRecorder>,
        queue: TranscodeQueue,
    ) -> Self {
        Self {
            uploads,
            assets,
            queue,
            defaults: TranscodeOptions::default(),
        }
    }

    /// Options applied to every submitted job; the request host is filled in per call.
    pub fn with_options(mut self, defaults: TranscodeOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn uploads(&self) -> &Arc<UploadSessionManager> {
        &self.uploads
    }

    pub fn queue(&self) -> &TranscodeQueue {
        &self.queue
    }

    /// Complete the upload, move the asset to `processing` and queue its transcode.
    #[tracing::instrument(skip(self, request_host), fields(upload_id = %upload_id))]
    pub async fn complete(
        &self,
        upload_id: &str,
        request_host: Option<String>,
    ) -> Result<IngestResult, AppError> {
        let completed = self.uploads.complete_upload(upload_id).await?;
        let asset_id = completed.asset_id;

        // The session is gone now; a failed hand-off cannot be retried, so it is recorded
        if let Err(e) = self.hand_off(&completed, request_host).await {
            tracing::error!(asset_id = %asset_id, error = %e, "Failed to hand off upload");
            if let Err(mark_err) = self.assets.mark_error(asset_id, &e.to_string()).await {
                tracing::error!(asset_id = %asset_id, error = %mark_err, "Failed to record hand-off failure");
            }
            if let Err(rm_err) = tokio::fs::remove_file(&completed.file_path).await {
                if rm_err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %completed.file_path.display(), error = %rm_err, "Failed to remove reassembled upload");
                }
            }
            return Err(e);
        }

        tracing::info!(asset_id = %asset_id, "Upload handed off for transcoding");

        Ok(IngestResult {
            video_id: asset_id,
            file_path: completed.file_path,
            storage_key: completed.storage_key,
            metadata: completed.metadata,
        })
    }

    async fn hand_off(
        &self,
        completed: &CompletedUpload,
        request_host: Option<String>,
    ) -> Result<(), AppError> {
        let asset_id = completed.asset_id;
        if !self
            .assets
            .mark_processing(asset_id, &completed.storage_key, completed.metadata.as_ref())
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Video asset {} is no longer uploading",
                asset_id
            )));
        }
        self.assets.update_progress(asset_id, PROGRESS_HANDOFF).await?;

        let options = TranscodeOptions {
            public_host: request_host,
            ..self.defaults.clone()
        };
        self.queue
            .submit(asset_id, completed.file_path.clone(), options)
            .await?;
        Ok(())
    }
}
