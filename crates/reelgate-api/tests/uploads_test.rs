//! Upload API integration tests.
//!
//! Run with: `cargo test -p reelgate-api --test uploads_test`

mod helpers;

use helpers::{initialize, send_chunk, setup_test_app, upload_all, wait_for_terminal};
use serde_json::{json, Value};

#[tokio::test]
async fn test_upload_complete_and_transcode() {
    let app = setup_test_app().await;
    let client = app.client();

    let data = b"0123456789AB";
    let session = initialize(client, "holiday clip.mp4", data.len() as u64).await;
    assert_eq!(session["chunkSize"], 5);
    assert_eq!(session["totalChunks"], 3);
    let upload_id = session["uploadId"].as_str().unwrap().to_string();
    let video_id = session["videoId"].as_str().unwrap().to_string();
    assert_eq!(upload_id.len(), 32);

    upload_all(client, &upload_id, data).await;

    let progress: Value = client
        .get(&format!("/api/v1/uploads/progress/{}", upload_id))
        .await
        .json();
    assert_eq!(progress["uploaded"], 3);
    assert_eq!(progress["percentage"], 100.0);
    assert_eq!(progress["complete"], true);

    let response = client
        .post("/api/v1/uploads/complete")
        .json(&json!({ "uploadId": upload_id }))
        .await;
    response.assert_status_ok();
    let completed: Value = response.json();
    assert_eq!(completed["videoId"], video_id.as_str());
    let minio_path = completed["minioPath"].as_str().unwrap();
    assert!(minio_path.starts_with(&format!("videos/{}/original/", video_id)));
    assert!(minio_path.ends_with("_holiday_clip.mp4"));
    assert_eq!(completed["metadata"]["width"], 1280);

    let video = wait_for_terminal(client, &video_id).await;
    assert_eq!(video["status"], "ready");
    assert_eq!(video["progress"], 100);
    assert!(video["hlsPlaylistUrl"]
        .as_str()
        .unwrap()
        .ends_with(&format!("videos/{}/hls/master.m3u8", video_id)));
    assert!(video["thumbnailUrl"].as_str().unwrap().ends_with("thumbnail.jpg"));
    assert_eq!(video["qualities"].as_array().unwrap().len(), 2);

    // The session is gone once the original is stored
    client
        .get(&format!("/api/v1/uploads/progress/{}", upload_id))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_disallowed_format_is_rejected() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post("/api/v1/uploads/initialize")
        .json(&json!({ "filename": "setup.exe", "fileSize": 10, "mimeType": "application/octet-stream" }))
        .await;

    assert_eq!(response.status_code(), 415);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNSUPPORTED_FORMAT");
    assert_eq!(body["recoverable"], false);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post("/api/v1/uploads/initialize")
        .json(&json!({ "filename": "big.mp4", "fileSize": 1001, "mimeType": "video/mp4" }))
        .await;

    assert_eq!(response.status_code(), 413);
    let body: Value = response.json();
    assert_eq!(body["code"], "FILE_TOO_LARGE");
}

#[tokio::test]
async fn test_malformed_body_uses_error_shape() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post("/api/v1/uploads/initialize")
        .json(&json!({ "filename": "clip.mp4" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_chunk_for_unknown_session() {
    let app = setup_test_app().await;
    let response = send_chunk(app.client(), &"0".repeat(32), 0, b"abc").await;

    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_chunk_index_out_of_range() {
    let app = setup_test_app().await;
    let client = app.client();
    let session = initialize(client, "clip.mp4", 12).await;
    let upload_id = session["uploadId"].as_str().unwrap();

    let response = send_chunk(client, upload_id, 3, b"abc").await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_CHUNK_INDEX");
}

#[tokio::test]
async fn test_missing_multipart_field() {
    let app = setup_test_app().await;
    let form = axum_test::multipart::MultipartForm::new().add_text("chunkIndex", "0");
    let response = app
        .client()
        .post("/api/v1/uploads/chunk")
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_incomplete_upload_cannot_complete_then_resumes() {
    let app = setup_test_app().await;
    let client = app.client();
    let session = initialize(client, "clip.mp4", 12).await;
    let upload_id = session["uploadId"].as_str().unwrap();

    send_chunk(client, upload_id, 0, b"01234").await.assert_status_ok();
    send_chunk(client, upload_id, 2, b"AB").await.assert_status_ok();

    let response = client
        .post("/api/v1/uploads/complete")
        .json(&json!({ "uploadId": upload_id }))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["code"], "INCOMPLETE_UPLOAD");
    assert_eq!(body["recoverable"], true);

    let resume: Value = client
        .post(&format!("/api/v1/uploads/resume/{}", upload_id))
        .await
        .json();
    assert_eq!(resume["uploadedChunks"], json!([0, 2]));
    assert_eq!(resume["totalChunks"], 3);
    assert_eq!(resume["chunkSize"], 5);

    let progress: Value = client
        .get(&format!("/api/v1/uploads/progress/{}", upload_id))
        .await
        .json();
    assert_eq!(progress["percentage"], 66.67);
    assert_eq!(progress["complete"], false);

    // The missing chunk is all it takes
    send_chunk(client, upload_id, 1, b"56789").await.assert_status_ok();
    client
        .post("/api/v1/uploads/complete")
        .json(&json!({ "uploadId": upload_id }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_cancel_upload_is_idempotent() {
    let app = setup_test_app().await;
    let client = app.client();
    let session = initialize(client, "clip.mp4", 12).await;
    let upload_id = session["uploadId"].as_str().unwrap();
    let video_id = session["videoId"].as_str().unwrap();

    for _ in 0..2 {
        let body: Value = client
            .post(&format!("/api/v1/uploads/cancel/{}", upload_id))
            .await
            .json();
        assert_eq!(body, json!({ "success": true }));
    }

    client
        .get(&format!("/api/v1/uploads/progress/{}", upload_id))
        .await
        .assert_status_not_found();
    client
        .get(&format!("/api/v1/videos/{}", video_id))
        .await
        .assert_status_not_found();
}
