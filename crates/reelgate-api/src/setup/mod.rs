//! Application setup and initialization
//!
//! Builds every component from [`Config`] and starts the background tasks; the binary and the
//! integration tests share these functions.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use reelgate_core::Config;
use reelgate_processing::{FfmpegEngine, TranscodeEngine};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A wired application ready to be served.
pub struct Application {
    pub state: Arc<AppState>,
    pub router: axum::Router,
    /// Sweeper and supervisor loops, aborted on shutdown
    pub background_tasks: Vec<JoinHandle<()>>,
}

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<Application> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(&config.base.log_format)?;
    tracing::info!(
        environment = %config.base.environment,
        "Configuration loaded and validated successfully"
    );

    let repositories = database::setup_repositories(&config).await?;
    let storage = storage::setup_storage(&config).await?;

    let engine: Arc<dyn TranscodeEngine> = Arc::new(
        FfmpegEngine::new(
            config.transcode.ffmpeg_path.clone(),
            config.transcode.ffprobe_path.clone(),
        )
        .context("Invalid FFMPEG_PATH or FFPROBE_PATH")?,
    );

    let config = Arc::new(config);
    let state = services::initialize_services(config.clone(), &repositories, storage, engine);
    let background_tasks =
        services::start_background_tasks(&config, &state, &repositories).await?;

    let router = routes::setup_routes(&config, state.clone());

    Ok(Application {
        state,
        router,
        background_tasks,
    })
}
