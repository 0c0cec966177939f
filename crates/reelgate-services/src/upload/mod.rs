//! Resumable upload sessions and the abandonment sweep.

mod manager;
mod sweeper;

pub use manager::{
    chunk_file_name, is_valid_session_id, InitializeUpload, UploadSessionManager, UploadSettings,
};
pub use sweeper::SessionSweeper;
