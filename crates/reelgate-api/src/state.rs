//! Shared application state handed to every handler.

use reelgate_core::Config;
use reelgate_db::AssetStateRecorder;
use reelgate_services::{IngestService, TranscodeQueue, UploadSessionManager};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub uploads: Arc<UploadSessionManager>,
    pub ingest: Arc<IngestService>,
    pub queue: TranscodeQueue,
    pub assets: Arc<dyn AssetStateRecorder>,
}
