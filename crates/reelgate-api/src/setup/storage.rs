//! Object storage setup

use anyhow::{Context, Result};
use reelgate_core::Config;
use reelgate_storage::Storage;
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage = reelgate_storage::create_storage(&config.storage)
        .await
        .context("Failed to initialize object storage")?;

    tracing::info!(backend = ?config.storage.backend, "Object storage initialized");
    Ok(storage)
}
