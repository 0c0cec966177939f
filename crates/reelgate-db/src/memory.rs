//! In-memory repository implementations
//!
//! Used when no database is configured, and by tests. State is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelgate_core::models::{
    AssetOutputs, AssetStatus, JobStatus, TranscodeJob, UploadSession, VideoAsset, VideoMetadata,
};
use reelgate_core::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::repository::{AssetStateRecorder, SessionStore, TranscodeJobRepository};

/// A poisoned lock only means another task panicked mid-update; the map is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn asset_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Video asset {}", id))
}

#[derive(Clone, Default)]
pub struct InMemoryAssetRepository {
    assets: Arc<Mutex<HashMap<Uuid, VideoAsset>>>,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `apply` only when the asset is in `from` (any state when `None`)
    fn update_from<F>(&self, id: Uuid, from: Option<AssetStatus>, apply: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut VideoAsset),
    {
        let mut assets = lock(&self.assets);
        let asset = assets.get_mut(&id).ok_or_else(|| asset_not_found(id))?;
        if from.is_some_and(|status| asset.status != status) {
            return Ok(false);
        }
        apply(asset);
        asset.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl AssetStateRecorder for InMemoryAssetRepository {
    async fn create_asset(&self, asset: &VideoAsset) -> Result<(), AppError> {
        let mut assets = lock(&self.assets);
        if assets.contains_key(&asset.id) {
            return Err(AppError::Conflict(format!(
                "Video asset {} already exists",
                asset.id
            )));
        }
        assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<VideoAsset>, AppError> {
        Ok(lock(&self.assets).get(&id).cloned())
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        original_path: &str,
        metadata: Option<&VideoMetadata>,
    ) -> Result<bool, AppError> {
        self.update_from(id, Some(AssetStatus::Uploading), |asset| {
            asset.status = AssetStatus::Processing;
            asset.original_path = Some(original_path.to_string());
            if let Some(metadata) = metadata {
                asset.metadata = Some(metadata.clone());
            }
        })
    }

    async fn record_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<(), AppError> {
        self.update_from(id, None, |asset| asset.metadata = Some(metadata.clone()))
            .map(|_| ())
    }

    async fn update_progress(&self, id: Uuid, progress: u8) -> Result<bool, AppError> {
        self.update_from(id, Some(AssetStatus::Processing), |asset| {
            asset.processing_progress = progress.min(100)
        })
    }

    async fn mark_ready(&self, id: Uuid, outputs: &AssetOutputs) -> Result<bool, AppError> {
        self.update_from(id, Some(AssetStatus::Processing), |asset| {
            asset.status = AssetStatus::Ready;
            asset.processing_progress = 100;
            asset.thumbnail_url = outputs.thumbnail_url.clone();
            asset.hls_playlist_url = outputs.hls_playlist_url.clone();
            asset.qualities = outputs.qualities.clone();
            asset.error_message = None;
        })
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> Result<bool, AppError> {
        let mut assets = lock(&self.assets);
        match assets.get_mut(&id) {
            Some(asset) if !asset.status.is_terminal() => {
                asset.status = AssetStatus::Error;
                asset.error_message = Some(message.to_string());
                asset.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn discard_uploading(&self, id: Uuid) -> Result<bool, AppError> {
        let mut assets = lock(&self.assets);
        match assets.get(&id) {
            Some(asset) if asset.status == AssetStatus::Uploading => {
                assets.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, UploadSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &UploadSession) -> Result<(), AppError> {
        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(&session.id) {
            return Err(AppError::Conflict(format!(
                "Upload session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<UploadSession>, AppError> {
        Ok(lock(&self.sessions).get(id).cloned())
    }

    async fn record_chunk(&self, id: &str, index: u32) -> Result<Option<UploadSession>, AppError> {
        let mut sessions = lock(&self.sessions);
        Ok(sessions.get_mut(id).map(|session| {
            session.received_chunks.insert(index);
            session.last_activity_at = Utc::now();
            session.clone()
        }))
    }

    async fn touch(&self, id: &str) -> Result<(), AppError> {
        if let Some(session) = lock(&self.sessions).get_mut(id) {
            session.last_activity_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(lock(&self.sessions).remove(id).is_some())
    }

    async fn list_inactive(&self, before: DateTime<Utc>) -> Result<Vec<UploadSession>, AppError> {
        let mut inactive: Vec<UploadSession> = lock(&self.sessions)
            .values()
            .filter(|s| s.last_activity_at < before)
            .cloned()
            .collect();
        inactive.sort_by_key(|s| s.last_activity_at);
        Ok(inactive)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTranscodeJobRepository {
    jobs: Arc<Mutex<HashMap<Uuid, TranscodeJob>>>,
}

impl InMemoryTranscodeJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a job's heartbeat, for exercising stall detection
    pub fn set_heartbeat(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(job) = lock(&self.jobs).get_mut(&id) {
            job.last_heartbeat_at = Some(at);
        }
    }
}

#[async_trait]
impl TranscodeJobRepository for InMemoryTranscodeJobRepository {
    async fn insert(&self, job: &TranscodeJob) -> Result<(), AppError> {
        lock(&self.jobs).insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TranscodeJob>, AppError> {
        Ok(lock(&self.jobs).get(&id).cloned())
    }

    async fn mark_running(&self, id: Uuid) -> Result<bool, AppError> {
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Queued => {
                let now = Utc::now();
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                job.last_heartbeat_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn heartbeat(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(job) = lock(&self.jobs).get_mut(&id) {
            if job.status == JobStatus::Running {
                job.last_heartbeat_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<bool, AppError> {
        if !status.is_finished() {
            return Err(AppError::Internal(format!(
                "Cannot finish job with non-final status {}",
                status
            )));
        }

        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&id) {
            Some(job) if !job.status.is_finished() => {
                job.status = status;
                job.error_message = error_message.map(str::to_string);
                job.finished_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<TranscodeJob>, AppError> {
        let mut jobs: Vec<TranscodeJob> = lock(&self.jobs)
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn find_stale_running(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<TranscodeJob>, AppError> {
        let mut jobs: Vec<TranscodeJob> = lock(&self.jobs)
            .values()
            .filter(|j| {
                let last_seen = j.last_heartbeat_at.or(j.started_at).unwrap_or(j.created_at);
                j.status == JobStatus::Running && last_seen < before
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn latest_for_asset(&self, asset_id: Uuid) -> Result<Option<TranscodeJob>, AppError> {
        Ok(lock(&self.jobs)
            .values()
            .filter(|j| j.asset_id == asset_id)
            .max_by_key(|j| j.created_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn session(id: &str) -> UploadSession {
        let now = Utc::now();
        UploadSession {
            id: id.to_string(),
            asset_id: Uuid::new_v4(),
            original_filename: "clip.mp4".to_string(),
            declared_size: 30,
            mime_type: "video/mp4".to_string(),
            owner_id: "owner".to_string(),
            chunk_size: 10,
            total_chunks: 3,
            received_chunks: BTreeSet::new(),
            scratch_dir: PathBuf::from("/tmp/reelgate-test"),
            created_at: now,
            last_activity_at: now,
        }
    }

    async fn processing_asset(repo: &InMemoryAssetRepository) -> VideoAsset {
        let asset = VideoAsset::new_uploading("owner", "clip.mp4");
        repo.create_asset(&asset).await.unwrap();
        assert!(repo
            .mark_processing(asset.id, "videos/x/original/clip.mp4", None)
            .await
            .unwrap());
        asset
    }

    #[tokio::test]
    async fn test_record_chunk_is_idempotent() {
        let store = InMemorySessionStore::new();
        store.insert(&session("abc")).await.unwrap();

        store.record_chunk("abc", 2).await.unwrap();
        let updated = store.record_chunk("abc", 2).await.unwrap().unwrap();

        assert_eq!(updated.uploaded_count(), 1);
        assert!(store.record_chunk("missing", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_inactive_uses_last_activity() {
        let store = InMemorySessionStore::new();
        let mut old = session("old");
        old.last_activity_at = Utc::now() - Duration::hours(25);
        store.insert(&old).await.unwrap();
        store.insert(&session("fresh")).await.unwrap();

        let inactive = store
            .list_inactive(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, "old");
    }

    #[tokio::test]
    async fn test_mark_error_does_not_override_ready() {
        let repo = InMemoryAssetRepository::new();
        let asset = processing_asset(&repo).await;

        assert!(repo
            .mark_ready(
                asset.id,
                &AssetOutputs {
                    hls_playlist_url: Some("http://cdn/master.m3u8".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap());

        assert!(!repo.mark_error(asset.id, "late failure").await.unwrap());
        let stored = repo.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AssetStatus::Ready);
        assert_eq!(stored.processing_progress, 100);
    }

    #[tokio::test]
    async fn test_error_is_final() {
        let repo = InMemoryAssetRepository::new();
        let asset = processing_asset(&repo).await;
        repo.update_progress(asset.id, 40).await.unwrap();
        assert!(repo.mark_error(asset.id, "transcode stalled").await.unwrap());

        assert!(!repo.update_progress(asset.id, 95).await.unwrap());
        assert!(!repo.mark_ready(asset.id, &AssetOutputs::default()).await.unwrap());
        assert!(!repo.mark_error(asset.id, "later failure").await.unwrap());
        assert!(!repo
            .mark_processing(asset.id, "videos/x/original/clip.mp4", None)
            .await
            .unwrap());

        let stored = repo.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AssetStatus::Error);
        assert_eq!(stored.error_message.as_deref(), Some("transcode stalled"));
        assert_eq!(stored.processing_progress, 40);
    }

    #[tokio::test]
    async fn test_progress_only_moves_while_processing() {
        let repo = InMemoryAssetRepository::new();
        let asset = VideoAsset::new_uploading("owner", "clip.mp4");
        repo.create_asset(&asset).await.unwrap();

        assert!(!repo.update_progress(asset.id, 10).await.unwrap());
        assert!(!repo.mark_ready(asset.id, &AssetOutputs::default()).await.unwrap());
        assert_eq!(
            repo.get_asset(asset.id).await.unwrap().unwrap().status,
            AssetStatus::Uploading
        );
    }

    #[tokio::test]
    async fn test_progress_on_missing_asset_is_not_found() {
        let repo = InMemoryAssetRepository::new();
        assert!(matches!(
            repo.update_progress(Uuid::new_v4(), 50).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_job_lifecycle_guards() {
        let repo = InMemoryTranscodeJobRepository::new();
        let job = TranscodeJob::new_queued(Uuid::new_v4(), PathBuf::from("/tmp/in.mp4"), Default::default());
        repo.insert(&job).await.unwrap();

        assert!(repo.finish(job.id, JobStatus::Cancelled, None).await.unwrap());
        assert!(!repo.mark_running(job.id).await.unwrap());
        assert!(!repo.finish(job.id, JobStatus::Failed, Some("x")).await.unwrap());
        assert!(repo.finish(job.id, JobStatus::Running, None).await.is_err());
    }

    #[tokio::test]
    async fn test_stale_running_jobs_found() {
        let repo = InMemoryTranscodeJobRepository::new();
        let job = TranscodeJob::new_queued(Uuid::new_v4(), PathBuf::from("/tmp/in.mp4"), Default::default());
        repo.insert(&job).await.unwrap();
        repo.mark_running(job.id).await.unwrap();
        repo.set_heartbeat(job.id, Utc::now() - Duration::minutes(30));

        let stale = repo
            .find_stale_running(Utc::now() - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, job.id);
    }
}
