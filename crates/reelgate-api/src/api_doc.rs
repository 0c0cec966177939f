//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use reelgate_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Reelgate API",
        version = "0.1.0",
        description = "Resumable chunked video uploads with background HLS transcoding. Versioned endpoints live under /api/v1/."
    ),
    paths(
        handlers::health::health_check,
        // Uploads
        handlers::uploads::initialize_upload,
        handlers::uploads::upload_chunk,
        handlers::uploads::complete_upload,
        handlers::uploads::get_upload_progress,
        handlers::uploads::resume_upload,
        handlers::uploads::cancel_upload,
        // Videos
        handlers::videos::get_video,
        handlers::videos::cancel_transcode,
    ),
    components(schemas(
        error::ErrorResponse,
        handlers::health::HealthResponse,
        handlers::uploads::InitializeUploadRequest,
        handlers::uploads::InitializeUploadResponse,
        handlers::uploads::CompleteUploadRequest,
        handlers::uploads::CompleteUploadResponse,
        handlers::uploads::CancelUploadResponse,
        handlers::videos::VideoResponse,
        handlers::videos::CancelTranscodeResponse,
        models::ChunkReceipt,
        models::UploadProgress,
        models::ResumeInfo,
        models::VideoMetadata,
        models::QualityOutput,
        models::AssetStatus,
    )),
    tags(
        (name = "uploads", description = "Resumable chunked uploads"),
        (name = "videos", description = "Video asset status and transcoding"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
