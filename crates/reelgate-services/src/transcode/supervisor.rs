use chrono::Utc;
use reelgate_core::models::JobStatus;
use reelgate_core::{AppError, TranscodeConfig};
use reelgate_db::{AssetStateRecorder, TranscodeJobRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

pub const STALLED_MESSAGE: &str = "transcode stalled";

/// Fails `running` jobs whose heartbeat stopped, and records their assets as `error`.
#[derive(Clone)]
pub struct JobSupervisor {
    jobs: Arc<dyn TranscodeJobRepository>,
    assets: Arc<dyn AssetStateRecorder>,
    interval: Duration,
    heartbeat_timeout: Duration,
}

impl JobSupervisor {
    pub fn new(
        jobs: Arc<dyn TranscodeJobRepository>,
        assets: Arc<dyn AssetStateRecorder>,
        interval: Duration,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            assets,
            interval,
            heartbeat_timeout,
        }
    }

    pub fn from_config(
        jobs: Arc<dyn TranscodeJobRepository>,
        assets: Arc<dyn AssetStateRecorder>,
        config: &TranscodeConfig,
    ) -> Self {
        Self::new(
            jobs,
            assets,
            Duration::from_secs(config.job_supervisor_interval_secs),
            Duration::from_secs(config.job_heartbeat_timeout_secs),
        )
    }

    /// Start the background supervisor.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut check_interval = interval(self.interval);
            check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                check_interval.tick().await;
                if let Err(e) = self.check_stalled().await {
                    tracing::error!(error = %e, "Transcode supervisor pass failed");
                }
            }
        })
    }

    /// One supervision pass; returns the number of jobs declared dead.
    #[tracing::instrument(skip(self))]
    pub async fn check_stalled(&self) -> Result<usize, AppError> {
        let timeout = chrono::Duration::from_std(self.heartbeat_timeout)
            .map_err(|e| AppError::Internal(format!("Invalid heartbeat timeout: {}", e)))?;
        let stale = self.jobs.find_stale_running(Utc::now() - timeout).await?;

        let mut failed = 0;
        for job in stale {
            if !self
                .jobs
                .finish(job.id, JobStatus::Failed, Some(STALLED_MESSAGE))
                .await?
            {
                continue;
            }
            failed += 1;

            tracing::warn!(
                job_id = %job.id,
                asset_id = %job.asset_id,
                last_heartbeat_at = ?job.last_heartbeat_at,
                "Transcode job stalled, marking failed"
            );

            if let Err(e) = self.assets.mark_error(job.asset_id, STALLED_MESSAGE).await {
                tracing::error!(asset_id = %job.asset_id, error = %e, "Failed to record stalled asset");
            }
        }

        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelgate_core::models::{AssetStatus, TranscodeJob, TranscodeOptions, VideoAsset};
    use reelgate_db::{InMemoryAssetRepository, InMemoryTranscodeJobRepository};
    use std::path::PathBuf;

    struct Fixture {
        supervisor: JobSupervisor,
        jobs: Arc<InMemoryTranscodeJobRepository>,
        assets: Arc<InMemoryAssetRepository>,
    }

    fn fixture() -> Fixture {
        let jobs = Arc::new(InMemoryTranscodeJobRepository::new());
        let assets = Arc::new(InMemoryAssetRepository::new());
        let supervisor = JobSupervisor::new(
            jobs.clone(),
            assets.clone(),
            Duration::from_secs(30),
            Duration::from_secs(120),
        );
        Fixture {
            supervisor,
            jobs,
            assets,
        }
    }

    async fn running_job(f: &Fixture) -> TranscodeJob {
        let asset = VideoAsset::new_uploading("owner-1", "clip.mp4");
        f.assets.create_asset(&asset).await.unwrap();
        f.assets
            .mark_processing(asset.id, "videos/x/original/clip.mp4", None)
            .await
            .unwrap();

        let job = TranscodeJob::new_queued(
            asset.id,
            PathBuf::from("/tmp/clip.mp4"),
            TranscodeOptions::default(),
        );
        f.jobs.insert(&job).await.unwrap();
        assert!(f.jobs.mark_running(job.id).await.unwrap());
        job
    }

    #[tokio::test]
    async fn test_stalled_job_is_failed_and_asset_errored() {
        let f = fixture();
        let job = running_job(&f).await;
        f.jobs
            .set_heartbeat(job.id, Utc::now() - chrono::Duration::seconds(300));

        assert_eq!(f.supervisor.check_stalled().await.unwrap(), 1);

        let job = f.jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(STALLED_MESSAGE));

        let asset = f.assets.get_asset(job.asset_id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Error);
        assert_eq!(asset.error_message.as_deref(), Some(STALLED_MESSAGE));

        // A second pass finds nothing left to fail
        assert_eq!(f.supervisor.check_stalled().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_heartbeat_is_left_alone() {
        let f = fixture();
        let job = running_job(&f).await;
        f.jobs
            .set_heartbeat(job.id, Utc::now() - chrono::Duration::seconds(10));

        assert_eq!(f.supervisor.check_stalled().await.unwrap(), 0);
        let job = f.jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_ready_asset_keeps_its_state() {
        let f = fixture();
        let job = running_job(&f).await;
        f.assets
            .mark_ready(job.asset_id, &Default::default())
            .await
            .unwrap();
        f.jobs
            .set_heartbeat(job.id, Utc::now() - chrono::Duration::seconds(300));

        assert_eq!(f.supervisor.check_stalled().await.unwrap(), 1);
        let asset = f.assets.get_asset(job.asset_id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Ready);
    }
}
