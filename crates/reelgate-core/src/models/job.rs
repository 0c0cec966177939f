use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Per-asset pipeline options, captured when the upload is handed off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscodeOptions {
    pub generate_thumbnail: bool,
    /// Seek offset for the thumbnail frame; the configured default when unset
    pub thumbnail_offset_secs: Option<f64>,
    pub generate_hls: bool,
    /// Quality labels; the configured variants when empty
    pub qualities: Vec<String>,
    /// Host of the request that completed the upload, used for public URLs
    pub public_host: Option<String>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            generate_thumbnail: true,
            thumbnail_offset_secs: None,
            generate_hls: true,
            qualities: Vec::new(),
            public_host: None,
        }
    }
}

/// Durable record of one transcoding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub input_path: PathBuf,
    pub options: TranscodeOptions,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TranscodeJob {
    pub fn new_queued(asset_id: Uuid, input_path: PathBuf, options: TranscodeOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_id,
            input_path,
            options,
            status: JobStatus::Queued,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            last_heartbeat_at: None,
            finished_at: None,
        }
    }
}
