//! Test helpers: build the router over in-memory stores, local storage and a scripted engine.

#![allow(dead_code)]

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use reelgate_api::setup::{routes, services};
use reelgate_core::Config;
use reelgate_db::Repositories;
use reelgate_processing::test_helpers::FakeEngine;
use reelgate_storage::LocalStorage;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const BASE_URL: &str = "http://localhost:4000/media";
pub const CHUNK_SIZE: usize = 5;

pub struct TestApp {
    pub server: TestServer,
    pub engine: FakeEngine,
    pub _root: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

fn test_config(root: &TempDir) -> Config {
    let dir = |name: &str| root.path().join(name).display().to_string();
    let vars: HashMap<&str, String> = HashMap::from([
        ("ENVIRONMENT", "test".to_string()),
        ("CHUNK_SIZE_BYTES", CHUNK_SIZE.to_string()),
        ("MAX_UPLOAD_SIZE_BYTES", "1000".to_string()),
        ("ALLOWED_VIDEO_FORMATS", "mp4,mov".to_string()),
        ("TEMP_DIR", dir("chunks")),
        ("UPLOAD_DIR", dir("uploads")),
        ("PROCESSED_DIR", dir("processed")),
        ("HLS_VARIANTS", "360p,720p".to_string()),
        ("STORAGE_BACKEND", "local".to_string()),
        ("LOCAL_STORAGE_PATH", dir("storage")),
        ("LOCAL_STORAGE_BASE_URL", BASE_URL.to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(FakeEngine::new()).await
}

pub async fn setup_test_app_with(engine: FakeEngine) -> TestApp {
    let root = TempDir::new().unwrap();
    let config = Arc::new(test_config(&root));

    let storage = LocalStorage::new(root.path().join("storage"), BASE_URL.to_string())
        .await
        .unwrap();

    let state = services::initialize_services(
        config.clone(),
        &Repositories::in_memory(),
        Arc::new(storage),
        Arc::new(engine.clone()),
    );
    let router = routes::setup_routes(&config, state);

    TestApp {
        server: TestServer::new(router).unwrap(),
        engine,
        _root: root,
    }
}

/// Open a session and return the reply body
pub async fn initialize(client: &TestServer, filename: &str, file_size: u64) -> Value {
    let response = client
        .post("/api/v1/uploads/initialize")
        .json(&json!({
            "filename": filename,
            "fileSize": file_size,
            "mimeType": "video/mp4",
            "ownerId": "owner-1"
        }))
        .await;
    response.assert_status_ok();
    response.json()
}

pub async fn send_chunk(client: &TestServer, upload_id: &str, index: u32, bytes: &[u8]) -> axum_test::TestResponse {
    let form = MultipartForm::new()
        .add_text("uploadId", upload_id.to_string())
        .add_text("chunkIndex", index.to_string())
        .add_part(
            "chunk",
            Part::bytes(bytes.to_vec())
                .file_name("blob")
                .mime_type("application/octet-stream"),
        );
    client.post("/api/v1/uploads/chunk").multipart(form).await
}

/// Upload `data` in `CHUNK_SIZE` pieces, last chunk first
pub async fn upload_all(client: &TestServer, upload_id: &str, data: &[u8]) {
    let chunks: Vec<&[u8]> = data.chunks(CHUNK_SIZE).collect();
    for (index, chunk) in chunks.iter().enumerate().rev() {
        send_chunk(client, upload_id, index as u32, chunk)
            .await
            .assert_status_ok();
    }
}

/// Poll the video until it leaves `processing`
pub async fn wait_for_terminal(client: &TestServer, video_id: &str) -> Value {
    for _ in 0..500 {
        let video: Value = client
            .get(&format!("/api/v1/videos/{}", video_id))
            .await
            .json();
        if video["status"] == "ready" || video["status"] == "error" {
            return video;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("video {} never left processing", video_id);
}
