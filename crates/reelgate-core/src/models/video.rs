use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppError;

/// Lifecycle of a video asset: `uploading → processing → {ready | error}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Uploading,
    Processing,
    Ready,
    Error,
}

impl AssetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Ready | AssetStatus::Error)
    }
}

impl Display for AssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetStatus::Uploading => write!(f, "uploading"),
            AssetStatus::Processing => write!(f, "processing"),
            AssetStatus::Ready => write!(f, "ready"),
            AssetStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for AssetStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(AssetStatus::Uploading),
            "processing" => Ok(AssetStatus::Processing),
            "ready" => Ok(AssetStatus::Ready),
            "error" => Ok(AssetStatus::Error),
            other => Err(AppError::Internal(format!("Unknown asset status: {}", other))),
        }
    }
}

/// Technical metadata probed from a video file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Container bitrate in bits per second
    pub bitrate: Option<u64>,
    pub codec: String,
    pub fps: Option<f32>,
    pub size_bytes: u64,
}

/// One encoded rendition as stored in object storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QualityOutput {
    pub label: String,
    /// Object-storage key of the rendition playlist
    pub path: String,
    /// Total bytes of the rendition (playlist plus segments)
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoAsset {
    pub id: Uuid,
    pub owner_id: String,
    pub original_filename: String,
    pub original_path: Option<String>,
    pub status: AssetStatus,
    pub processing_progress: u8,
    pub thumbnail_url: Option<String>,
    pub hls_playlist_url: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<VideoMetadata>,
    pub qualities: Vec<QualityOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoAsset {
    /// A freshly registered asset, waiting for its upload to complete.
    pub fn new_uploading(owner_id: impl Into<String>, original_filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            original_filename: original_filename.into(),
            original_path: None,
            status: AssetStatus::Uploading,
            processing_progress: 0,
            thumbnail_url: None,
            hls_playlist_url: None,
            error_message: None,
            metadata: None,
            qualities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Final artifact locations written when an asset becomes ready.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetOutputs {
    pub thumbnail_url: Option<String>,
    pub hls_playlist_url: Option<String>,
    pub qualities: Vec<QualityOutput>,
}

impl AssetOutputs {
    /// `ready` requires a playlist when HLS was generated, a thumbnail otherwise.
    pub fn validate_for_ready(&self, hls_requested: bool) -> Result<(), AppError> {
        if hls_requested && self.hls_playlist_url.is_none() {
            return Err(AppError::Internal(
                "Cannot mark asset ready without an HLS playlist".to_string(),
            ));
        }
        if !hls_requested && self.thumbnail_url.is_none() {
            return Err(AppError::Internal(
                "Cannot mark asset ready without a thumbnail".to_string(),
            ));
        }
        Ok(())
    }
}
