//! Resumable chunked upload endpoints.

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap},
    Json,
};
use bytes::Bytes;
use reelgate_core::models::{ChunkReceipt, ResumeInfo, UploadProgress, VideoMetadata};
use reelgate_core::AppError;
use reelgate_services::InitializeUpload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitializeUploadRequest {
    /// Original filename; its extension must be an allowed video format
    pub filename: String,
    /// Total file size in bytes
    pub file_size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitializeUploadResponse {
    pub upload_id: String,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub video_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub upload_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub video_id: Uuid,
    /// Local path of the reassembled file
    pub file_path: String,
    /// Object-storage key of the original
    pub minio_path: String,
    pub metadata: Option<VideoMetadata>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelUploadResponse {
    pub success: bool,
}

/// Host the client used to reach us, for rewriting loopback public URLs
fn request_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// Open an upload session
#[utoipa::path(
    post,
    path = "/api/v1/uploads/initialize",
    tag = "uploads",
    request_body = InitializeUploadRequest,
    responses(
        (status = 200, description = "Upload session created", body = InitializeUploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 415, description = "Unsupported format", body = ErrorResponse)
    )
)]
pub async fn initialize_upload(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitializeUploadRequest>,
) -> Result<Json<InitializeUploadResponse>, HttpAppError> {
    let session = state
        .uploads
        .initialize_upload(InitializeUpload {
            filename: request.filename,
            declared_size: request.file_size,
            mime_type: request.mime_type,
            owner_id: request.owner_id,
        })
        .await?;

    Ok(Json(InitializeUploadResponse {
        upload_id: session.id,
        chunk_size: session.chunk_size,
        total_chunks: session.total_chunks,
        video_id: session.asset_id,
    }))
}

/// Upload one chunk as multipart fields `uploadId`, `chunkIndex` and `chunk`
#[utoipa::path(
    post,
    path = "/api/v1/uploads/chunk",
    tag = "uploads",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkReceipt),
        (status = 400, description = "Invalid chunk", body = ErrorResponse),
        (status = 404, description = "Unknown upload session", body = ErrorResponse)
    )
)]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ChunkReceipt>, HttpAppError> {
    let mut upload_id: Option<String> = None;
    let mut chunk_index: Option<u32> = None;
    let mut chunk: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("uploadId") => upload_id = Some(field.text().await?.trim().to_string()),
            Some("chunkIndex") => {
                let raw = field.text().await?;
                let index = raw.trim().parse::<u32>().map_err(|_| {
                    AppError::InvalidInput(format!("chunkIndex must be a non-negative integer, got {:?}", raw))
                })?;
                chunk_index = Some(index);
            }
            Some("chunk") => chunk = Some(field.bytes().await?),
            _ => {}
        }
    }

    let upload_id =
        upload_id.ok_or_else(|| AppError::InvalidInput("Missing field uploadId".to_string()))?;
    let chunk_index =
        chunk_index.ok_or_else(|| AppError::InvalidInput("Missing field chunkIndex".to_string()))?;
    let chunk = chunk.ok_or_else(|| AppError::InvalidInput("Missing field chunk".to_string()))?;

    let receipt = state
        .uploads
        .upload_chunk(&upload_id, chunk_index, chunk)
        .await?;
    Ok(Json(receipt))
}

/// Reassemble the upload, store the original and queue transcoding
#[utoipa::path(
    post,
    path = "/api/v1/uploads/complete",
    tag = "uploads",
    request_body = CompleteUploadRequest,
    responses(
        (status = 200, description = "Upload handed off for transcoding", body = CompleteUploadResponse),
        (status = 404, description = "Unknown upload session", body = ErrorResponse),
        (status = 409, description = "Chunks missing or completion in progress", body = ErrorResponse),
        (status = 502, description = "Object storage failure", body = ErrorResponse)
    )
)]
pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<CompleteUploadRequest>,
) -> Result<Json<CompleteUploadResponse>, HttpAppError> {
    let result = state
        .ingest
        .complete(&request.upload_id, request_host(&headers))
        .await?;

    Ok(Json(CompleteUploadResponse {
        video_id: result.video_id,
        file_path: result.file_path.display().to_string(),
        minio_path: result.storage_key,
        metadata: result.metadata,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/uploads/progress/{upload_id}",
    tag = "uploads",
    params(("upload_id" = String, Path, description = "Upload session id")),
    responses(
        (status = 200, description = "Upload progress", body = UploadProgress),
        (status = 404, description = "Unknown upload session", body = ErrorResponse)
    )
)]
pub async fn get_upload_progress(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadProgress>, HttpAppError> {
    Ok(Json(state.uploads.get_upload_progress(&upload_id).await?))
}

/// Chunks already received, so the client sends only what is missing
#[utoipa::path(
    post,
    path = "/api/v1/uploads/resume/{upload_id}",
    tag = "uploads",
    params(("upload_id" = String, Path, description = "Upload session id")),
    responses(
        (status = 200, description = "Resume information", body = ResumeInfo),
        (status = 404, description = "Unknown upload session", body = ErrorResponse)
    )
)]
pub async fn resume_upload(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<ResumeInfo>, HttpAppError> {
    Ok(Json(state.uploads.resume_upload(&upload_id).await?))
}

/// Drop a session and its chunks; unknown sessions succeed too
#[utoipa::path(
    post,
    path = "/api/v1/uploads/cancel/{upload_id}",
    tag = "uploads",
    params(("upload_id" = String, Path, description = "Upload session id")),
    responses(
        (status = 200, description = "Upload cancelled", body = CancelUploadResponse)
    )
)]
pub async fn cancel_upload(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<CancelUploadResponse>, HttpAppError> {
    state.uploads.cancel_upload(&upload_id).await?;
    Ok(Json(CancelUploadResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_host_reads_host_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_host(&headers), None);

        headers.insert(header::HOST, HeaderValue::from_static("media.example.com:4000"));
        assert_eq!(
            request_host(&headers).as_deref(),
            Some("media.example.com:4000")
        );
    }
}
