//! Reelgate persistence layer
//!
//! Asset state, upload sessions and transcode jobs are stored behind the traits in
//! [`repository`]. PostgreSQL implementations are used when a database is configured;
//! the in-memory implementations back single-process deployments and tests.

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::{InMemoryAssetRepository, InMemorySessionStore, InMemoryTranscodeJobRepository};
pub use postgres::{
    connect_and_migrate, PgAssetRepository, PgSessionStore, PgTranscodeJobRepository,
};
pub use repository::{AssetStateRecorder, SessionStore, TranscodeJobRepository};

use sqlx::PgPool;
use std::sync::Arc;

/// The three stores used by the services, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub assets: Arc<dyn AssetStateRecorder>,
    pub sessions: Arc<dyn SessionStore>,
    pub jobs: Arc<dyn TranscodeJobRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            assets: Arc::new(PgAssetRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            jobs: Arc::new(PgTranscodeJobRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            assets: Arc::new(InMemoryAssetRepository::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            jobs: Arc::new(InMemoryTranscodeJobRepository::new()),
        }
    }
}
