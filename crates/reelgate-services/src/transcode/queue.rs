use reelgate_core::models::{JobStatus, TranscodeJob, TranscodeOptions};
use reelgate_core::{AppError, TranscodeConfig};
use reelgate_db::{AssetStateRecorder, TranscodeJobRepository};
use reelgate_processing::VideoPipeline;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Worker pool sizing and heartbeat cadence.
#[derive(Debug, Clone)]
pub struct TranscodeQueueConfig {
    pub max_concurrent: usize,
    pub queue_size: usize,
    pub heartbeat_interval: Duration,
}

impl From<&TranscodeConfig> for TranscodeQueueConfig {
    fn from(config: &TranscodeConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_transcodes,
            queue_size: config.video_job_queue_size,
            heartbeat_interval: Duration::from_secs(config.job_heartbeat_interval_secs),
        }
    }
}

/// Job currently owned by this process, with the token that stops it.
#[derive(Clone)]
struct ActiveJob {
    job_id: Uuid,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

const CANCELLED_MESSAGE: &str = "Transcode cancelled";

struct Worker {
    pipeline: Arc<VideoPipeline>,
    jobs: Arc<dyn TranscodeJobRepository>,
    assets: Arc<dyn AssetStateRecorder>,
    active: Arc<Mutex<HashMap<Uuid, ActiveJob>>>,
    heartbeat_interval: Duration,
}

/// Durable transcode jobs run on a bounded worker pool.
#[derive(Clone)]
pub struct TranscodeQueue {
    tx: mpsc::Sender<TranscodeJob>,
    jobs: Arc<dyn TranscodeJobRepository>,
    assets: Arc<dyn AssetStateRecorder>,
    active: Arc<Mutex<HashMap<Uuid, ActiveJob>>>,
}

impl TranscodeQueue {
    /// Create the queue and spawn its worker pool.
    ///
    /// At most `max_concurrent` jobs run at once; `queue_size` bounds the channel.
    pub fn new(
        pipeline: Arc<VideoPipeline>,
        jobs: Arc<dyn TranscodeJobRepository>,
        assets: Arc<dyn AssetStateRecorder>,
        config: TranscodeQueueConfig,
    ) -> Self {
        let queue_size = config.queue_size.max(1);
        let max_concurrent = config.max_concurrent.max(1);
        let (tx, rx) = mpsc::channel(queue_size);
        let active = Arc::new(Mutex::new(HashMap::new()));

        let worker = Arc::new(Worker {
            pipeline,
            jobs: jobs.clone(),
            assets: assets.clone(),
            active: active.clone(),
            heartbeat_interval: config.heartbeat_interval,
        });

        tokio::spawn(async move {
            Worker::pool(rx, worker, max_concurrent).await;
        });

        tracing::info!(
            queue_size = queue_size,
            max_concurrent = max_concurrent,
            "Transcode queue initialized with bounded channel"
        );

        Self {
            tx,
            jobs,
            assets,
            active,
        }
    }

    /// Persist a `queued` job for the asset and hand it to the worker pool.
    ///
    /// Waits for room when the channel is full; the upload behind it is already stored.
    #[tracing::instrument(skip(self, options), fields(asset_id = %asset_id, job.type = "transcode"))]
    pub async fn submit(
        &self,
        asset_id: Uuid,
        input_path: PathBuf,
        options: TranscodeOptions,
    ) -> Result<TranscodeJob, AppError> {
        let job = TranscodeJob::new_queued(asset_id, input_path, options);
        self.jobs.insert(&job).await?;
        self.enqueue(job.clone()).await?;

        tracing::info!(job_id = %job.id, "Enqueued transcode job");
        Ok(job)
    }

    async fn enqueue(&self, job: TranscodeJob) -> Result<(), AppError> {
        lock(&self.active).insert(
            job.asset_id,
            ActiveJob {
                job_id: job.id,
                cancel: CancellationToken::new(),
            },
        );

        let job_id = job.id;
        let asset_id = job.asset_id;
        if let Err(e) = self.tx.send(job).await {
            remove_active(&self.active, asset_id, job_id);
            let message = format!("Transcode queue is closed: {}", e);
            self.jobs.finish(job_id, JobStatus::Failed, Some(&message)).await?;
            return Err(AppError::Internal(message));
        }
        Ok(())
    }

    /// Stop the asset's transcode: a running job is signalled (its encoder is killed), a
    /// queued one is marked cancelled. Returns whether anything was cancelled.
    #[tracing::instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn cancel(&self, asset_id: Uuid) -> Result<bool, AppError> {
        let active = lock(&self.active).get(&asset_id).cloned();

        let job = match active {
            Some(active) => {
                active.cancel.cancel();
                self.jobs.get(active.job_id).await?
            }
            None => self.jobs.latest_for_asset(asset_id).await?,
        };

        let Some(job) = job else {
            return Ok(false);
        };

        match job.status {
            JobStatus::Queued => {
                if self
                    .jobs
                    .finish(job.id, JobStatus::Cancelled, Some(CANCELLED_MESSAGE))
                    .await?
                {
                    self.assets.mark_error(asset_id, CANCELLED_MESSAGE).await?;
                }
                tracing::info!(job_id = %job.id, "Queued transcode cancelled");
                Ok(true)
            }
            JobStatus::Running => {
                // Only a job owned by this process can be signalled
                let signalled = lock(&self.active)
                    .get(&asset_id)
                    .is_some_and(|a| a.job_id == job.id);
                if signalled {
                    tracing::info!(job_id = %job.id, "Running transcode signalled to stop");
                }
                Ok(signalled)
            }
            _ => Ok(false),
        }
    }

    /// Re-submit `queued` jobs left by a previous process.
    ///
    /// Jobs whose input file is gone are failed. `running` jobs are left to the
    /// supervisor. Returns the number of jobs re-submitted.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize, AppError> {
        let queued = self.jobs.list_by_status(JobStatus::Queued).await?;
        let mut resubmitted = 0;

        for job in queued {
            if lock(&self.active).contains_key(&job.asset_id) {
                continue;
            }

            if tokio::fs::try_exists(&job.input_path).await.unwrap_or(false) {
                self.enqueue(job).await?;
                resubmitted += 1;
            } else {
                let message = format!("Input file missing: {}", job.input_path.display());
                tracing::warn!(job_id = %job.id, asset_id = %job.asset_id, "{}", message);
                if self.jobs.finish(job.id, JobStatus::Failed, Some(&message)).await? {
                    self.assets.mark_error(job.asset_id, &message).await?;
                }
            }
        }

        if resubmitted > 0 {
            tracing::info!(resubmitted, "Recovered queued transcode jobs");
        }
        Ok(resubmitted)
    }

    /// Whether this process is running or holding a job for the asset
    pub fn is_active(&self, asset_id: Uuid) -> bool {
        lock(&self.active).contains_key(&asset_id)
    }
}

fn remove_active(active: &Mutex<HashMap<Uuid, ActiveJob>>, asset_id: Uuid, job_id: Uuid) {
    let mut active = lock(active);
    if active.get(&asset_id).is_some_and(|a| a.job_id == job_id) {
        active.remove(&asset_id);
    }
}

impl Worker {
    async fn pool(mut rx: mpsc::Receiver<TranscodeJob>, worker: Arc<Worker>, max_concurrent: usize) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        while let Some(job) = rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = worker.clone();

            tokio::spawn(async move {
                let _permit = permit;
                worker.run(job).await;
            });
        }
    }

    #[tracing::instrument(
        skip(self, job),
        fields(job_id = %job.id, asset_id = %job.asset_id, job.status = tracing::field::Empty)
    )]
    async fn run(&self, job: TranscodeJob) {
        self.execute(&job).await;
        remove_active(&self.active, job.asset_id, job.id);

        // Every exit lands here; the original is in object storage already
        if let Err(e) = tokio::fs::remove_file(&job.input_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %job.input_path.display(), error = %e, "Failed to remove reassembled upload");
            }
        }
    }

    async fn execute(&self, job: &TranscodeJob) {
        let cancel = lock(&self.active)
            .get(&job.asset_id)
            .filter(|a| a.job_id == job.id)
            .map(|a| a.cancel.clone())
            .unwrap_or_default();

        if cancel.is_cancelled() {
            self.finish_unstarted(job, JobStatus::Cancelled, CANCELLED_MESSAGE).await;
            return;
        }

        match self.jobs.mark_running(job.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("Job no longer queued, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to mark job running");
                let message = format!("Failed to start transcode: {}", e);
                self.finish_unstarted(job, JobStatus::Failed, &message).await;
                return;
            }
        }

        let start = std::time::Instant::now();
        let heartbeat_stop = CancellationToken::new();
        let heartbeat = tokio::spawn(Self::heartbeat(
            self.jobs.clone(),
            job.id,
            self.heartbeat_interval,
            heartbeat_stop.clone(),
        ));

        let result = self
            .pipeline
            .process_video(&job.input_path, job.asset_id, &job.options, &cancel)
            .await;

        heartbeat_stop.cancel();
        if let Err(e) = heartbeat.await {
            tracing::warn!(error = %e, "Heartbeat task ended abnormally");
        }

        let (status, message) = match &result {
            Ok(_) => (JobStatus::Completed, None),
            Err(AppError::Cancelled(_)) => (JobStatus::Cancelled, Some(CANCELLED_MESSAGE.to_string())),
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };
        tracing::Span::current().record("job.status", status.to_string().as_str());

        match self.jobs.finish(job.id, status, message.as_deref()).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Job was already finished by someone else"),
            Err(e) => tracing::error!(error = %e, "Failed to record job result"),
        }

        tracing::info!(
            status = %status,
            duration_ms = start.elapsed().as_millis() as u64,
            "Transcode job finished"
        );
    }

    /// Close out a job that never reached the pipeline, recording the outcome on its asset
    async fn finish_unstarted(&self, job: &TranscodeJob, status: JobStatus, message: &str) {
        tracing::Span::current().record("job.status", status.to_string().as_str());
        match self.jobs.finish(job.id, status, Some(message)).await {
            Ok(true) => {
                if let Err(e) = self.assets.mark_error(job.asset_id, message).await {
                    tracing::error!(error = %e, "Failed to record job outcome on asset");
                }
            }
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "Failed to record job result"),
        }
    }

    async fn heartbeat(
        jobs: Arc<dyn TranscodeJobRepository>,
        job_id: Uuid,
        every: Duration,
        stop: CancellationToken,
    ) {
        let mut ticker = interval(every.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; mark_running already stamped the heartbeat
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = jobs.heartbeat(job_id).await {
                        tracing::warn!(job_id = %job_id, error = %e, "Failed to write job heartbeat");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelgate_core::constants::PROGRESS_HANDOFF;
    use reelgate_core::models::{AssetStatus, VideoAsset};
    use reelgate_db::{InMemoryAssetRepository, InMemoryTranscodeJobRepository};
    use reelgate_processing::test_helpers::FakeEngine;
    use reelgate_processing::PipelineConfig;
    use reelgate_storage::LocalStorage;
    use std::future::Future;
    use tempfile::TempDir;

    struct Fixture {
        queue: TranscodeQueue,
        jobs: Arc<InMemoryTranscodeJobRepository>,
        assets: Arc<InMemoryAssetRepository>,
        root: TempDir,
    }

    impl Fixture {
        /// A processing asset with a reassembled input file on disk
        async fn asset_with_input(&self) -> (Uuid, PathBuf) {
            let asset = VideoAsset::new_uploading("owner-1", "clip.mp4");
            self.assets.create_asset(&asset).await.unwrap();
            self.assets
                .mark_processing(asset.id, "videos/x/original/clip.mp4", None)
                .await
                .unwrap();
            self.assets
                .update_progress(asset.id, PROGRESS_HANDOFF)
                .await
                .unwrap();

            let input = self.root.path().join(format!("{}.mp4", asset.id));
            tokio::fs::write(&input, vec![1u8; 512]).await.unwrap();
            (asset.id, input)
        }

        async fn job_status(&self, job_id: Uuid) -> JobStatus {
            self.jobs.get(job_id).await.unwrap().unwrap().status
        }

        async fn asset_status(&self, asset_id: Uuid) -> AssetStatus {
            self.assets.get_asset(asset_id).await.unwrap().unwrap().status
        }
    }

    async fn fixture(engine: FakeEngine, max_concurrent: usize, heartbeat: Duration) -> Fixture {
        let root = TempDir::new().unwrap();
        let jobs = Arc::new(InMemoryTranscodeJobRepository::new());
        let assets = Arc::new(InMemoryAssetRepository::new());
        let storage = LocalStorage::new(
            root.path().join("storage"),
            "http://localhost:4000/media".to_string(),
        )
        .await
        .unwrap();

        let pipeline = Arc::new(VideoPipeline::new(
            Arc::new(engine),
            Arc::new(storage),
            assets.clone(),
            PipelineConfig {
                processed_dir: root.path().join("processed"),
                hls_segment_duration: 10,
                default_qualities: vec!["360p".to_string()],
                thumbnail_offset_secs: 1.0,
                max_parallel_encodes: 1,
            },
        ));

        let queue = TranscodeQueue::new(
            pipeline,
            jobs.clone(),
            assets.clone(),
            TranscodeQueueConfig {
                max_concurrent,
                queue_size: 8,
                heartbeat_interval: heartbeat,
            },
        );

        Fixture {
            queue,
            jobs,
            assets,
            root,
        }
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..500 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_submitted_job_completes_and_asset_is_ready() {
        let f = fixture(FakeEngine::new(), 2, Duration::from_secs(5)).await;
        let f = &f;
        let (asset_id, input) = f.asset_with_input().await;

        let job = f
            .queue
            .submit(asset_id, input.clone(), TranscodeOptions::default())
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        let job_id = job.id;

        eventually(|| async move { f.job_status(job_id).await == JobStatus::Completed }).await;

        let asset = f.assets.get_asset(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Ready);
        assert_eq!(asset.processing_progress, 100);
        assert!(asset.hls_playlist_url.is_some());

        let input = &input;
        eventually(|| async move { !input.exists() }).await;
        assert!(!f.queue.is_active(asset_id));
    }

    #[tokio::test]
    async fn test_failed_encode_fails_job() {
        let f = fixture(FakeEngine::new().failing_on("360p"), 1, Duration::from_secs(5)).await;
        let f = &f;
        let (asset_id, input) = f.asset_with_input().await;

        let job = f
            .queue
            .submit(asset_id, input, TranscodeOptions::default())
            .await
            .unwrap();
        let job_id = job.id;

        eventually(|| async move { f.job_status(job_id).await == JobStatus::Failed }).await;

        let stored = f.jobs.get(job.id).await.unwrap().unwrap();
        assert!(stored.error_message.unwrap().contains("360p"));
        assert_eq!(f.asset_status(asset_id).await, AssetStatus::Error);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let f = fixture(FakeEngine::new().blocking_until_cancel(), 1, Duration::from_secs(5)).await;
        let f = &f;
        let (asset_id, input) = f.asset_with_input().await;

        let job = f
            .queue
            .submit(asset_id, input, TranscodeOptions::default())
            .await
            .unwrap();
        let job_id = job.id;
        eventually(|| async move { f.job_status(job_id).await == JobStatus::Running }).await;

        assert!(f.queue.cancel(asset_id).await.unwrap());

        eventually(|| async move { f.job_status(job_id).await == JobStatus::Cancelled }).await;
        assert_eq!(f.asset_status(asset_id).await, AssetStatus::Error);
        eventually(|| async move { !f.queue.is_active(asset_id) }).await;
    }

    #[tokio::test]
    async fn test_cancel_queued_job_never_runs() {
        let f = fixture(FakeEngine::new().blocking_until_cancel(), 1, Duration::from_secs(5)).await;
        let f = &f;
        let (first_asset, first_input) = f.asset_with_input().await;
        let (second_asset, second_input) = f.asset_with_input().await;

        let first = f
            .queue
            .submit(first_asset, first_input, TranscodeOptions::default())
            .await
            .unwrap();
        let first_id = first.id;
        eventually(|| async move { f.job_status(first_id).await == JobStatus::Running }).await;

        let second = f
            .queue
            .submit(second_asset, second_input.clone(), TranscodeOptions::default())
            .await
            .unwrap();
        assert!(f.queue.cancel(second_asset).await.unwrap());
        assert_eq!(f.job_status(second.id).await, JobStatus::Cancelled);
        assert_eq!(f.asset_status(second_asset).await, AssetStatus::Error);

        // Free the only worker; the cancelled job must be skipped
        assert!(f.queue.cancel(first_asset).await.unwrap());
        eventually(|| async move { !f.queue.is_active(second_asset) }).await;

        let second = f.jobs.get(second.id).await.unwrap().unwrap();
        assert_eq!(second.status, JobStatus::Cancelled);
        assert!(second.started_at.is_none());

        let second_input = &second_input;
        eventually(|| async move { !second_input.exists() }).await;
    }

    #[tokio::test]
    async fn test_job_finished_while_queued_drops_its_input() {
        let f = fixture(FakeEngine::new().blocking_until_cancel(), 1, Duration::from_secs(5)).await;
        let f = &f;
        let (first_asset, first_input) = f.asset_with_input().await;
        let (second_asset, second_input) = f.asset_with_input().await;

        let first = f
            .queue
            .submit(first_asset, first_input, TranscodeOptions::default())
            .await
            .unwrap();
        let first_id = first.id;
        eventually(|| async move { f.job_status(first_id).await == JobStatus::Running }).await;

        let second = f
            .queue
            .submit(second_asset, second_input.clone(), TranscodeOptions::default())
            .await
            .unwrap();
        assert!(f
            .jobs
            .finish(second.id, JobStatus::Failed, Some("failed elsewhere"))
            .await
            .unwrap());

        assert!(f.queue.cancel(first_asset).await.unwrap());
        let second_input = &second_input;
        eventually(|| async move { !second_input.exists() }).await;

        let second = f.jobs.get(second.id).await.unwrap().unwrap();
        assert_eq!(second.status, JobStatus::Failed);
        assert!(second.started_at.is_none());
        assert!(!f.queue.is_active(second_asset));
    }

    #[tokio::test]
    async fn test_cancel_without_job_is_noop() {
        let f = fixture(FakeEngine::new(), 1, Duration::from_secs(5)).await;
        assert!(!f.queue.cancel(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_recover_resubmits_queued_jobs() {
        let f = fixture(FakeEngine::new(), 2, Duration::from_secs(5)).await;
        let f = &f;
        let (present_asset, present_input) = f.asset_with_input().await;
        let (missing_asset, _) = f.asset_with_input().await;

        let present = TranscodeJob::new_queued(present_asset, present_input, TranscodeOptions::default());
        let missing = TranscodeJob::new_queued(
            missing_asset,
            f.root.path().join("gone.mp4"),
            TranscodeOptions::default(),
        );
        f.jobs.insert(&present).await.unwrap();
        f.jobs.insert(&missing).await.unwrap();

        assert_eq!(f.queue.recover().await.unwrap(), 1);
        let present_id = present.id;

        eventually(|| async move { f.job_status(present_id).await == JobStatus::Completed }).await;
        assert_eq!(f.asset_status(present_asset).await, AssetStatus::Ready);

        assert_eq!(f.job_status(missing.id).await, JobStatus::Failed);
        assert_eq!(f.asset_status(missing_asset).await, AssetStatus::Error);
    }

    #[tokio::test]
    async fn test_running_job_heartbeats() {
        let engine = FakeEngine::new().with_encode_delay(Duration::from_millis(400));
        let f = fixture(engine, 1, Duration::from_millis(20)).await;
        let f = &f;
        let (asset_id, input) = f.asset_with_input().await;

        let job = f
            .queue
            .submit(asset_id, input, TranscodeOptions::default())
            .await
            .unwrap();
        let job_id = job.id;
        eventually(|| async move { f.job_status(job_id).await == JobStatus::Running }).await;

        let first_beat = f.jobs.get(job_id).await.unwrap().unwrap().last_heartbeat_at;
        assert!(first_beat.is_some());
        eventually(|| async move {
            let current = f.jobs.get(job_id).await.unwrap().unwrap();
            current.status == JobStatus::Running && current.last_heartbeat_at > first_beat
        })
        .await;

        eventually(|| async move { f.job_status(job_id).await == JobStatus::Completed }).await;
    }
}
