//! Persistence setup

use anyhow::Result;
use reelgate_core::Config;
use reelgate_db::{connect_and_migrate, Repositories};

/// PostgreSQL repositories when `DATABASE_URL` is set, in-memory ones otherwise.
pub async fn setup_repositories(config: &Config) -> Result<Repositories> {
    match &config.base.database_url {
        Some(url) => {
            let pool = connect_and_migrate(url, config.base.db_max_connections).await?;
            Ok(Repositories::postgres(pool))
        }
        None => {
            if config.is_production() {
                tracing::warn!(
                    "DATABASE_URL not set in production; sessions and jobs will not survive a restart"
                );
            } else {
                tracing::info!("DATABASE_URL not set, using in-memory repositories");
            }
            Ok(Repositories::in_memory())
        }
    }
}
