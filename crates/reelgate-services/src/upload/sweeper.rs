use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use super::UploadSessionManager;

/// Periodically cancels upload sessions that saw no activity for `timeout`.
#[derive(Clone)]
pub struct SessionSweeper {
    manager: Arc<UploadSessionManager>,
    interval: Duration,
    timeout: Duration,
}

impl SessionSweeper {
    pub fn new(manager: Arc<UploadSessionManager>, interval: Duration, timeout: Duration) -> Self {
        Self {
            manager,
            interval,
            timeout,
        }
    }

    /// Start the background sweep.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.interval);
            sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                timeout_secs = self.timeout.as_secs(),
                "Upload session sweeper started"
            );

            loop {
                sweep_interval.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::error!(error = %e, "Upload session sweep failed");
                }
            }
        })
    }

    /// One sweep pass; returns the number of sessions removed.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "abandoned_uploads"))]
    pub async fn sweep_once(&self) -> Result<usize, anyhow::Error> {
        let removed = self.manager.sweep_abandoned(self.timeout).await?;

        if removed > 0 {
            tracing::info!(removed, "Removed abandoned upload sessions");
        } else {
            tracing::debug!("No abandoned upload sessions");
        }

        Ok(removed)
    }
}
