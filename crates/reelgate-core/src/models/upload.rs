use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

use super::video::VideoMetadata;

/// Server-side state of one resumable upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// 128-bit random token, hex encoded
    pub id: String,
    pub asset_id: Uuid,
    pub original_filename: String,
    pub declared_size: u64,
    pub mime_type: String,
    pub owner_id: String,
    /// Chunk size captured at creation, later config changes do not apply
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub received_chunks: BTreeSet<u32>,
    /// Holds the raw chunk files until reassembly
    pub scratch_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl UploadSession {
    /// `ceil(declared_size / chunk_size)`; zero bytes means zero chunks.
    pub fn total_chunks_for(declared_size: u64, chunk_size: u64) -> u32 {
        if chunk_size == 0 {
            return 0;
        }
        declared_size.div_ceil(chunk_size) as u32
    }

    pub fn uploaded_count(&self) -> u32 {
        self.received_chunks.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded_count() >= self.total_chunks
    }

    pub fn contains_index(&self, index: u32) -> bool {
        index < self.total_chunks
    }

    pub fn receipt(&self) -> ChunkReceipt {
        ChunkReceipt {
            uploaded: self.uploaded_count(),
            total: self.total_chunks,
            complete: self.is_complete(),
        }
    }

    pub fn progress(&self) -> UploadProgress {
        let uploaded = self.uploaded_count();
        let percentage = if self.total_chunks == 0 {
            100.0
        } else {
            let raw = uploaded as f64 * 100.0 / self.total_chunks as f64;
            (raw * 100.0).round() / 100.0
        };
        UploadProgress {
            uploaded,
            total: self.total_chunks,
            percentage,
            complete: self.is_complete(),
        }
    }

    pub fn resume_info(&self) -> ResumeInfo {
        ResumeInfo {
            uploaded_chunks: self.received_chunks.iter().copied().collect(),
            total_chunks: self.total_chunks,
            chunk_size: self.chunk_size,
        }
    }
}

/// Returned for every accepted chunk. `complete` is informative only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub uploaded: u32,
    pub total: u32,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub uploaded: u32,
    pub total: u32,
    /// Rounded to two decimals
    pub percentage: f64,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResumeInfo {
    /// Received indices, ascending
    pub uploaded_chunks: Vec<u32>,
    pub total_chunks: u32,
    pub chunk_size: u64,
}

/// Result of a successful reassembly and upload of the original file.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    pub asset_id: Uuid,
    pub owner_id: String,
    /// Local path of the reassembled file
    pub file_path: PathBuf,
    /// Object-storage key of the original
    pub storage_key: String,
    pub metadata: Option<VideoMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(declared_size: u64, chunk_size: u64) -> UploadSession {
        let now = Utc::now();
        UploadSession {
            id: "0".repeat(32),
            asset_id: Uuid::new_v4(),
            original_filename: "clip.mp4".to_string(),
            declared_size,
            mime_type: "video/mp4".to_string(),
            owner_id: "owner".to_string(),
            chunk_size,
            total_chunks: UploadSession::total_chunks_for(declared_size, chunk_size),
            received_chunks: BTreeSet::new(),
            scratch_dir: PathBuf::from("/tmp/none"),
            created_at: now,
            last_activity_at: now,
        }
    }

    #[test]
    fn test_total_chunks_rounds_up() {
        const MIB: u64 = 1024 * 1024;
        assert_eq!(UploadSession::total_chunks_for(12 * MIB, 5 * MIB), 3);
        assert_eq!(UploadSession::total_chunks_for(10 * MIB, 5 * MIB), 2);
        assert_eq!(UploadSession::total_chunks_for(0, 5 * MIB), 0);
    }

    #[test]
    fn test_empty_upload_is_complete() {
        let s = session(0, 10);
        assert!(s.is_complete());
        assert_eq!(s.progress().percentage, 100.0);
    }

    #[test]
    fn test_progress_rounds_to_two_decimals() {
        let mut s = session(30, 10);
        s.received_chunks.insert(2);
        let progress = s.progress();
        assert_eq!(progress.uploaded, 1);
        assert_eq!(progress.percentage, 33.33);
        assert!(!progress.complete);
    }

    #[test]
    fn test_resume_lists_sorted_indices() {
        let mut s = session(30, 10);
        s.received_chunks.insert(2);
        s.received_chunks.insert(0);
        assert_eq!(s.resume_info().uploaded_chunks, vec![0, 2]);
    }
}
