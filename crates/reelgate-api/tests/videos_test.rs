//! Video status, transcode cancellation and service endpoints.
//!
//! Run with: `cargo test -p reelgate-api --test videos_test`

mod helpers;

use helpers::{initialize, setup_test_app, setup_test_app_with, upload_all, wait_for_terminal};
use reelgate_processing::test_helpers::FakeEngine;
use serde_json::{json, Value};
use std::time::Duration;

async fn uploaded_video(client: &axum_test::TestServer) -> String {
    let data = b"0123456789";
    let session = initialize(client, "clip.mp4", data.len() as u64).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_string();
    upload_all(client, &upload_id, data).await;

    let completed: Value = client
        .post("/api/v1/uploads/complete")
        .json(&json!({ "uploadId": upload_id }))
        .await
        .json();
    completed["videoId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_uploading_video_is_visible() {
    let app = setup_test_app().await;
    let client = app.client();
    let session = initialize(client, "clip.mp4", 10).await;
    let video_id = session["videoId"].as_str().unwrap();

    let video: Value = client
        .get(&format!("/api/v1/videos/{}", video_id))
        .await
        .json();
    assert_eq!(video["status"], "uploading");
    assert_eq!(video["progress"], 0);
    assert_eq!(video["ownerId"], "owner-1");
    assert!(video["hlsPlaylistUrl"].is_null());
}

#[tokio::test]
async fn test_unknown_and_malformed_video_ids() {
    let app = setup_test_app().await;
    let client = app.client();

    let response = client
        .get(&format!("/api/v1/videos/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");

    let response = client.get("/api/v1/videos/not-a-uuid").await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_failed_encode_is_reported_on_video() {
    let app = setup_test_app_with(FakeEngine::new().failing_on("720p")).await;
    let client = app.client();
    let video_id = uploaded_video(client).await;

    let video = wait_for_terminal(client, &video_id).await;
    assert_eq!(video["status"], "error");
    assert!(video["errorMessage"].as_str().unwrap().contains("720p"));
    assert!(video["hlsPlaylistUrl"].is_null());
}

#[tokio::test]
async fn test_cancel_running_transcode() {
    let app = setup_test_app_with(FakeEngine::new().blocking_until_cancel()).await;
    let client = app.client();
    let video_id = uploaded_video(client).await;

    // Wait for the encoder to be running
    for _ in 0..500 {
        let video: Value = client
            .get(&format!("/api/v1/videos/{}", video_id))
            .await
            .json();
        if video["progress"].as_u64().unwrap_or(0) >= 10 && video["status"] == "processing" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let body: Value = client
        .post(&format!("/api/v1/videos/{}/cancel", video_id))
        .await
        .json();
    assert_eq!(body["cancelled"], true);

    let video = wait_for_terminal(client, &video_id).await;
    assert_eq!(video["status"], "error");
    assert!(app.engine.encoded_labels().is_empty());
}

#[tokio::test]
async fn test_cancel_finished_transcode_reports_nothing() {
    let app = setup_test_app().await;
    let client = app.client();
    let video_id = uploaded_video(client).await;
    assert_eq!(wait_for_terminal(client, &video_id).await["status"], "ready");

    let body: Value = client
        .post(&format!("/api/v1/videos/{}/cancel", video_id))
        .await
        .json();
    assert_eq!(body["cancelled"], false);
}

#[tokio::test]
async fn test_health_and_openapi() {
    let app = setup_test_app().await;
    let client = app.client();

    let health = client.get("/health").await;
    health.assert_status_ok();
    assert_eq!(health.json::<Value>()["status"], "alive");

    let doc: Value = client.get("/api-docs/openapi.json").await.json();
    assert!(doc["paths"]["/api/v1/uploads/initialize"].is_object());
    assert!(doc["paths"]["/api/v1/videos/{video_id}"].is_object());
}
