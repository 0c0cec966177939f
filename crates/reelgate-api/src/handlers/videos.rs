//! Video asset status and transcode cancellation.

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use reelgate_core::models::{AssetStatus, QualityOutput, VideoAsset, VideoMetadata};
use reelgate_core::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub id: Uuid,
    pub owner_id: String,
    pub original_filename: String,
    pub status: AssetStatus,
    /// 0 to 100
    pub progress: u8,
    pub thumbnail_url: Option<String>,
    pub hls_playlist_url: Option<String>,
    pub qualities: Vec<QualityOutput>,
    pub metadata: Option<VideoMetadata>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoAsset> for VideoResponse {
    fn from(asset: VideoAsset) -> Self {
        Self {
            id: asset.id,
            owner_id: asset.owner_id,
            original_filename: asset.original_filename,
            status: asset.status,
            progress: asset.processing_progress,
            thumbnail_url: asset.thumbnail_url,
            hls_playlist_url: asset.hls_playlist_url,
            qualities: asset.qualities,
            metadata: asset.metadata,
            error_message: asset.error_message,
            created_at: asset.created_at,
            updated_at: asset.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelTranscodeResponse {
    pub cancelled: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/videos/{video_id}",
    tag = "videos",
    params(("video_id" = Uuid, Path, description = "Video asset id")),
    responses(
        (status = 200, description = "Asset state", body = VideoResponse),
        (status = 404, description = "Video not found", body = ErrorResponse)
    )
)]
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<VideoResponse>, HttpAppError> {
    let Path(video_id) = path?;
    let asset = state
        .assets
        .get_asset(video_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Video {}", video_id)))?;
    Ok(Json(asset.into()))
}

/// Stop the video's transcode; `cancelled` is false when nothing was running or queued
#[utoipa::path(
    post,
    path = "/api/v1/videos/{video_id}/cancel",
    tag = "videos",
    params(("video_id" = Uuid, Path, description = "Video asset id")),
    responses(
        (status = 200, description = "Cancellation result", body = CancelTranscodeResponse),
        (status = 404, description = "Video not found", body = ErrorResponse)
    )
)]
pub async fn cancel_transcode(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<CancelTranscodeResponse>, HttpAppError> {
    let Path(video_id) = path?;
    if state.assets.get_asset(video_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Video {}", video_id)).into());
    }

    let cancelled = state.queue.cancel(video_id).await?;
    tracing::info!(asset_id = %video_id, cancelled, "Transcode cancel requested");
    Ok(Json(CancelTranscodeResponse { cancelled }))
}
