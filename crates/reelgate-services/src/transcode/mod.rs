//! Durable transcode jobs: the worker queue and the heartbeat supervisor.

mod queue;
mod supervisor;

pub use queue::{TranscodeQueue, TranscodeQueueConfig};
pub use supervisor::{JobSupervisor, STALLED_MESSAGE};
