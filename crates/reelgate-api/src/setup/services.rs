//! Service construction and background task startup

use crate::state::AppState;
use anyhow::{Context, Result};
use reelgate_core::Config;
use reelgate_db::Repositories;
use reelgate_processing::{PipelineConfig, TranscodeEngine, VideoPipeline};
use reelgate_services::{
    IngestService, JobSupervisor, SessionSweeper, TranscodeQueue, TranscodeQueueConfig,
    UploadSessionManager, UploadSettings,
};
use reelgate_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Build the services behind the handlers. Spawns the transcode worker pool, so it must
/// run inside a Tokio runtime.
pub fn initialize_services(
    config: Arc<Config>,
    repositories: &Repositories,
    storage: Arc<dyn Storage>,
    engine: Arc<dyn TranscodeEngine>,
) -> Arc<AppState> {
    let uploads = Arc::new(UploadSessionManager::new(
        repositories.sessions.clone(),
        repositories.assets.clone(),
        storage.clone(),
        engine.clone(),
        UploadSettings::from(&config.upload),
    ));

    let pipeline = Arc::new(VideoPipeline::new(
        engine,
        storage,
        repositories.assets.clone(),
        PipelineConfig::from(&config.transcode),
    ));

    let queue = TranscodeQueue::new(
        pipeline,
        repositories.jobs.clone(),
        repositories.assets.clone(),
        TranscodeQueueConfig::from(&config.transcode),
    );

    let ingest = Arc::new(IngestService::new(
        uploads.clone(),
        repositories.assets.clone(),
        queue.clone(),
    ));

    Arc::new(AppState {
        config,
        uploads,
        ingest,
        queue,
        assets: repositories.assets.clone(),
    })
}

/// Re-submit jobs left queued by a previous process, then start the session sweeper
/// and the job supervisor.
pub async fn start_background_tasks(
    config: &Config,
    state: &AppState,
    repositories: &Repositories,
) -> Result<Vec<JoinHandle<()>>> {
    let recovered = state
        .queue
        .recover()
        .await
        .context("Failed to recover queued transcode jobs")?;
    tracing::info!(recovered, "Transcode queue recovery finished");

    let sweeper = Arc::new(SessionSweeper::new(
        state.uploads.clone(),
        Duration::from_secs(config.upload.session_sweep_interval_secs),
        Duration::from_secs(config.upload.session_timeout_secs),
    ));

    let supervisor = Arc::new(JobSupervisor::from_config(
        repositories.jobs.clone(),
        repositories.assets.clone(),
        &config.transcode,
    ));

    Ok(vec![sweeper.start(), supervisor.start()])
}
