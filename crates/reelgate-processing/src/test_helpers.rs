//! Test doubles for the transcoding engine and the asset recorder
//!
//! These allow exercising the pipeline and the services without ffmpeg or a database.

use async_trait::async_trait;
use reelgate_core::constants::{THUMBNAIL_FILE_NAME, VARIANT_PLAYLIST_NAME};
use reelgate_core::models::{AssetOutputs, VideoAsset, VideoMetadata};
use reelgate_core::AppError;
use reelgate_db::AssetStateRecorder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ffmpeg::{HlsEncodeRequest, TranscodeEngine};

const FAKE_VARIANT_PLAYLIST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-PLAYLIST-TYPE:VOD\n#EXTINF:10.0,\nsegment_000.ts\n#EXT-X-ENDLIST\n";

/// Sample probe result: 12 seconds of 1280x720 h264
pub fn sample_metadata() -> VideoMetadata {
    VideoMetadata {
        duration: 12.0,
        width: 1280,
        height: 720,
        bitrate: Some(2_500_000),
        codec: "h264".to_string(),
        fps: Some(30.0),
        size_bytes: 1024,
    }
}

/// Scripted engine: writes tiny fake artifacts and reports fixed progress steps.
#[derive(Clone)]
pub struct FakeEngine {
    metadata: VideoMetadata,
    probe_error: Option<String>,
    fail_on: Option<String>,
    fail_thumbnail: bool,
    block_until_cancel: bool,
    progress_steps: Vec<u8>,
    encode_delay: Duration,
    encoded: Arc<Mutex<Vec<String>>>,
    thumbnail_offsets: Arc<Mutex<Vec<f64>>>,
    probes: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            metadata: sample_metadata(),
            probe_error: None,
            fail_on: None,
            fail_thumbnail: false,
            block_until_cancel: false,
            progress_steps: vec![25, 50, 75],
            encode_delay: Duration::ZERO,
            encoded: Arc::new(Mutex::new(Vec::new())),
            thumbnail_offsets: Arc::new(Mutex::new(Vec::new())),
            probes: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_metadata(mut self, metadata: VideoMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn failing_probe(mut self, message: &str) -> Self {
        self.probe_error = Some(message.to_string());
        self
    }

    /// Encoding this quality label fails with `EncodingFailed`
    pub fn failing_on(mut self, label: &str) -> Self {
        self.fail_on = Some(label.to_string());
        self
    }

    pub fn failing_thumbnail(mut self) -> Self {
        self.fail_thumbnail = true;
        self
    }

    /// Encodes never finish on their own; they wait for the cancellation token
    pub fn blocking_until_cancel(mut self) -> Self {
        self.block_until_cancel = true;
        self
    }

    pub fn with_progress_steps(mut self, steps: Vec<u8>) -> Self {
        self.progress_steps = steps;
        self
    }

    pub fn with_encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = delay;
        self
    }

    /// Labels of the renditions that finished, in completion order
    pub fn encoded_labels(&self) -> Vec<String> {
        self.encoded.lock().unwrap().clone()
    }

    pub fn thumbnail_offsets(&self) -> Vec<f64> {
        self.thumbnail_offsets.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Highest number of encodes observed running at once
    pub fn max_concurrent_encodes(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    async fn probe_metadata(&self, path: &Path) -> Result<VideoMetadata, AppError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.probe_error {
            return Err(AppError::EncodingFailed(message.clone()));
        }
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .map_err(|e| AppError::EncodingFailed(format!("Input not readable: {}", e)))?;
        Ok(VideoMetadata {
            size_bytes,
            ..self.metadata.clone()
        })
    }

    async fn extract_thumbnail(
        &self,
        _path: &Path,
        output_dir: &Path,
        offset_secs: f64,
    ) -> Result<PathBuf, AppError> {
        self.thumbnail_offsets.lock().unwrap().push(offset_secs);
        if self.fail_thumbnail {
            return Err(AppError::EncodingFailed("no frame decoded".to_string()));
        }
        tokio::fs::create_dir_all(output_dir).await?;
        let path = output_dir.join(THUMBNAIL_FILE_NAME);
        tokio::fs::write(&path, b"\xFF\xD8\xFFfake-jpeg").await?;
        Ok(path)
    }

    async fn encode_hls(
        &self,
        request: &HlsEncodeRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AppError> {
        let label = request.preset.label;
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = RunningGuard(&self.running);
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!("Encoding {} cancelled", label)));
        }

        for step in &self.progress_steps {
            on_progress(*step);
            tokio::task::yield_now().await;
        }

        if !self.encode_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AppError::Cancelled(format!("Encoding {} cancelled", label)));
                }
                _ = tokio::time::sleep(self.encode_delay) => {}
            }
        }

        if self.block_until_cancel {
            cancel.cancelled().await;
            return Err(AppError::Cancelled(format!("Encoding {} cancelled", label)));
        }

        if self.fail_on.as_deref() == Some(label) {
            return Err(AppError::EncodingFailed(format!(
                "FFmpeg failed for {}: exit status 1",
                label
            )));
        }

        tokio::fs::create_dir_all(&request.output_dir).await?;
        let playlist = request.output_dir.join(VARIANT_PLAYLIST_NAME);
        tokio::fs::write(&playlist, FAKE_VARIANT_PLAYLIST).await?;
        tokio::fs::write(request.output_dir.join("segment_000.ts"), vec![0x47u8; 188]).await?;

        on_progress(100);
        self.encoded.lock().unwrap().push(label.to_string());
        Ok(playlist)
    }
}

/// Asset recorder that forwards to another one and keeps every progress write.
pub struct RecordingAssetRecorder {
    inner: Arc<dyn AssetStateRecorder>,
    progress_writes: Mutex<Vec<u8>>,
    drop_next_progress: AtomicBool,
    fail_progress: AtomicBool,
}

impl RecordingAssetRecorder {
    pub fn new(inner: Arc<dyn AssetStateRecorder>) -> Self {
        Self {
            inner,
            progress_writes: Mutex::new(Vec::new()),
            drop_next_progress: AtomicBool::new(false),
            fail_progress: AtomicBool::new(false),
        }
    }

    /// Every progress write fails, as an unreachable database would
    pub fn failing_progress_writes(self) -> Self {
        self.fail_progress.store(true, Ordering::SeqCst);
        self
    }

    /// Silently lose the first progress write, as a lagging replica would
    pub fn drop_first_progress_write(self) -> Self {
        self.drop_next_progress.store(true, Ordering::SeqCst);
        self
    }

    pub fn progress_writes(&self) -> Vec<u8> {
        self.progress_writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStateRecorder for RecordingAssetRecorder {
    async fn create_asset(&self, asset: &VideoAsset) -> Result<(), AppError> {
        self.inner.create_asset(asset).await
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<VideoAsset>, AppError> {
        self.inner.get_asset(id).await
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        original_path: &str,
        metadata: Option<&VideoMetadata>,
    ) -> Result<bool, AppError> {
        self.inner.mark_processing(id, original_path, metadata).await
    }

    async fn record_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<(), AppError> {
        self.inner.record_metadata(id, metadata).await
    }

    async fn update_progress(&self, id: Uuid, progress: u8) -> Result<bool, AppError> {
        self.progress_writes.lock().unwrap().push(progress);
        if self.fail_progress.load(Ordering::SeqCst) {
            return Err(AppError::Internal("progress store unavailable".to_string()));
        }
        if self.drop_next_progress.swap(false, Ordering::SeqCst) {
            return Ok(true);
        }
        self.inner.update_progress(id, progress).await
    }

    async fn mark_ready(&self, id: Uuid, outputs: &AssetOutputs) -> Result<bool, AppError> {
        self.inner.mark_ready(id, outputs).await
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> Result<bool, AppError> {
        self.inner.mark_error(id, message).await
    }

    async fn discard_uploading(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.discard_uploading(id).await
    }
}
