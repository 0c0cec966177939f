//! Route configuration and setup

use crate::api_doc::ApiDoc;
use crate::constants::{API_PREFIX, MULTIPART_OVERHEAD_BYTES};
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use reelgate_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

const DEFAULT_HTTP_CONCURRENCY_LIMIT: usize = 10_000;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router {
    // Server-level concurrency limit to protect against resource exhaustion under extreme load
    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HTTP_CONCURRENCY_LIMIT)
        .max(1);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(upload_routes(config))
        .merge(video_routes())
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn upload_routes(config: &Config) -> Router<Arc<AppState>> {
    // A chunk body is one chunk plus the multipart framing around it
    let chunk_body_limit = usize::try_from(config.upload.chunk_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route(
            &format!("{}/uploads/initialize", API_PREFIX),
            post(handlers::uploads::initialize_upload),
        )
        .route(
            &format!("{}/uploads/chunk", API_PREFIX),
            post(handlers::uploads::upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route(
            &format!("{}/uploads/complete", API_PREFIX),
            post(handlers::uploads::complete_upload),
        )
        .route(
            &format!("{}/uploads/progress/{{upload_id}}", API_PREFIX),
            get(handlers::uploads::get_upload_progress),
        )
        .route(
            &format!("{}/uploads/resume/{{upload_id}}", API_PREFIX),
            post(handlers::uploads::resume_upload),
        )
        .route(
            &format!("{}/uploads/cancel/{{upload_id}}", API_PREFIX),
            post(handlers::uploads::cancel_upload),
        )
}

fn video_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/videos/{{video_id}}", API_PREFIX),
            get(handlers::videos::get_video),
        )
        .route(
            &format!("{}/videos/{{video_id}}/cancel", API_PREFIX),
            post(handlers::videos::cancel_transcode),
        )
}
