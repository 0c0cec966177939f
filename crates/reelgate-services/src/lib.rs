//! Reelgate services
//!
//! Upload sessions, the durable transcode queue with its supervisor, and the ingest
//! hand-off that connects them.

pub mod ingest;
pub mod transcode;
pub mod upload;

pub use ingest::{IngestResult, IngestService};
pub use transcode::{JobSupervisor, TranscodeQueue, TranscodeQueueConfig};
pub use upload::{InitializeUpload, SessionSweeper, UploadSessionManager, UploadSettings};
