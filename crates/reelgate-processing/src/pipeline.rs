//! Video transcoding orchestration: probe → thumbnail → HLS renditions → upload → mark ready.

use futures::{StreamExt, TryStreamExt};
use reelgate_core::constants::{HLS_DIR_NAME, MASTER_PLAYLIST_NAME, PROGRESS_ENCODE_END, PROGRESS_HANDOFF};
use reelgate_core::models::{AssetOutputs, QualityOutput, QualityPreset, TranscodeOptions};
use reelgate_core::{AppError, TranscodeConfig};
use reelgate_db::AssetStateRecorder;
use reelgate_storage::{keys, mime, ObjectMetadata, Storage, StoredObject};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ffmpeg::{HlsEncodeRequest, TranscodeEngine};
use crate::hls::{master_playlist, rewrite_tree};
use crate::progress::{map_encode, ProgressComposer, ProgressRecorder};

/// Progress written once renditions are uploaded, before the asset is marked ready
const PROGRESS_UPLOADED: u8 = 95;

/// Config for the transcoding pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub processed_dir: PathBuf,
    pub hls_segment_duration: u64,
    /// Qualities encoded when a job does not name its own
    pub default_qualities: Vec<String>,
    pub thumbnail_offset_secs: f64,
    pub max_parallel_encodes: usize,
}

impl From<&TranscodeConfig> for PipelineConfig {
    fn from(config: &TranscodeConfig) -> Self {
        Self {
            processed_dir: config.processed_dir.clone(),
            hls_segment_duration: config.hls_segment_duration,
            default_qualities: config.hls_variants.clone(),
            thumbnail_offset_secs: config.thumbnail_offset_secs,
            max_parallel_encodes: config.max_parallel_encodes,
        }
    }
}

/// Drives one reassembled upload to a ready (or errored) asset.
pub struct VideoPipeline {
    engine: Arc<dyn TranscodeEngine>,
    storage: Arc<dyn Storage>,
    assets: Arc<dyn AssetStateRecorder>,
    config: PipelineConfig,
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), AppError> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled("Transcode cancelled".to_string()));
    }
    Ok(())
}

/// Thumbnail seek position, kept inside short clips.
pub fn clamp_thumbnail_offset(requested: f64, duration_secs: f64) -> f64 {
    let requested = requested.max(0.0);
    if duration_secs > 0.0 && requested > duration_secs / 2.0 {
        duration_secs / 2.0
    } else {
        requested
    }
}

impl VideoPipeline {
    pub fn new(
        engine: Arc<dyn TranscodeEngine>,
        storage: Arc<dyn Storage>,
        assets: Arc<dyn AssetStateRecorder>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            storage,
            assets,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<dyn TranscodeEngine> {
        &self.engine
    }

    /// Qualities a job will encode, validated and sorted low to high.
    pub fn resolve_qualities(&self, options: &TranscodeOptions) -> Result<Vec<QualityPreset>, AppError> {
        if !options.generate_hls {
            return Ok(Vec::new());
        }
        let labels = if options.qualities.is_empty() {
            &self.config.default_qualities
        } else {
            &options.qualities
        };
        let presets = QualityPreset::resolve_all(labels)?;
        if presets.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one HLS quality is required".to_string(),
            ));
        }
        Ok(presets)
    }

    /// Run the full pipeline for an asset.
    ///
    /// Any failure is recorded on the asset as `error` and returned. Objects already
    /// uploaded are kept; the local output directory is always removed.
    #[tracing::instrument(skip(self, options, cancel), fields(asset_id = %asset_id))]
    pub async fn process_video(
        &self,
        file_path: &Path,
        asset_id: Uuid,
        options: &TranscodeOptions,
        cancel: &CancellationToken,
    ) -> Result<AssetOutputs, AppError> {
        let start = std::time::Instant::now();
        let output_dir = self.config.processed_dir.join(asset_id.to_string());

        tracing::info!(input = %file_path.display(), "Starting video processing");

        let result = self
            .run(file_path, asset_id, options, cancel, &output_dir)
            .await;

        match &result {
            Ok(outputs) => {
                tracing::info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    quality_count = outputs.qualities.len(),
                    "Video processing completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Video processing failed"
                );
                match self.assets.mark_error(asset_id, &e.to_string()).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!("Asset already final, failure not recorded");
                    }
                    Err(record_err) => {
                        tracing::error!(error = %record_err, "Failed to record processing failure");
                    }
                }
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&output_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %output_dir.display(),
                    error = %e,
                    "Failed to clean up processing directory"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        file_path: &Path,
        asset_id: Uuid,
        options: &TranscodeOptions,
        cancel: &CancellationToken,
        output_dir: &Path,
    ) -> Result<AssetOutputs, AppError> {
        if !options.generate_thumbnail && !options.generate_hls {
            return Err(AppError::InvalidInput(
                "Nothing to generate: thumbnail and HLS are both disabled".to_string(),
            ));
        }
        let presets = self.resolve_qualities(options)?;
        let public_host = options.public_host.as_deref();

        let stored_progress = self
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video asset {}", asset_id)))?
            .processing_progress;
        let mut recorder =
            ProgressRecorder::new(self.assets.clone(), asset_id).starting_at(stored_progress);

        ensure_not_cancelled(cancel)?;
        let metadata = self.engine.probe_metadata(file_path).await?;
        self.assets.record_metadata(asset_id, &metadata).await?;

        tracing::info!(
            video_duration = metadata.duration,
            resolution = %format!("{}x{}", metadata.width, metadata.height),
            "Video metadata extracted"
        );

        tokio::fs::create_dir_all(output_dir).await?;
        let mut outputs = AssetOutputs::default();

        if options.generate_thumbnail {
            ensure_not_cancelled(cancel)?;
            let offset = clamp_thumbnail_offset(
                options
                    .thumbnail_offset_secs
                    .unwrap_or(self.config.thumbnail_offset_secs),
                metadata.duration,
            );
            let thumbnail = self
                .engine
                .extract_thumbnail(file_path, output_dir, offset)
                .await?;

            let key = keys::thumbnail_key(asset_id);
            self.storage
                .upload_file(&thumbnail, &key, mime::JPEG, &ObjectMetadata::new())
                .await?;
            outputs.thumbnail_url = Some(self.storage.public_url(&key, public_host));

            tracing::debug!(key = %key, offset_secs = offset, "Thumbnail uploaded");
        }
        recorder.record(PROGRESS_HANDOFF).await;

        if options.generate_hls {
            ensure_not_cancelled(cancel)?;
            let hls_dir = output_dir.join(HLS_DIR_NAME);
            self.encode_renditions(file_path, &hls_dir, &presets, metadata.duration, cancel, &mut recorder)
                .await?;
            recorder.record(PROGRESS_ENCODE_END).await;

            tokio::fs::write(hls_dir.join(MASTER_PLAYLIST_NAME), master_playlist(&presets)).await?;

            let hls_prefix = keys::hls_prefix(asset_id);
            rewrite_tree(&hls_dir, &self.storage.public_url(&hls_prefix, public_host)).await?;

            ensure_not_cancelled(cancel)?;
            let uploaded = self.storage.upload_directory(&hls_dir, &hls_prefix).await?;

            tracing::info!(object_count = uploaded.len(), "HLS files uploaded");

            outputs.qualities = quality_outputs(asset_id, &presets, &uploaded);
            outputs.hls_playlist_url = Some(
                self.storage
                    .public_url(&keys::master_playlist_key(asset_id), public_host),
            );
        } else {
            recorder.record(PROGRESS_ENCODE_END).await;
        }

        recorder.record(PROGRESS_UPLOADED).await;

        outputs.validate_for_ready(options.generate_hls)?;
        ensure_not_cancelled(cancel)?;
        if !self.assets.mark_ready(asset_id, &outputs).await? {
            return Err(AppError::Conflict(format!(
                "Video asset {} is no longer processing",
                asset_id
            )));
        }

        Ok(outputs)
    }

    /// Encode every rendition with at most `max_parallel_encodes` running at once,
    /// persisting composed progress as it moves.
    async fn encode_renditions(
        &self,
        input: &Path,
        hls_dir: &Path,
        presets: &[QualityPreset],
        duration_secs: f64,
        cancel: &CancellationToken,
        recorder: &mut ProgressRecorder,
    ) -> Result<(), AppError> {
        let (tx, mut rx) = watch::channel(0u8);
        let parallel = self.config.max_parallel_encodes.max(1);
        let segment_duration = self.config.hls_segment_duration;
        let engine = &self.engine;

        let encodes = async {
            let tx = tx;
            let composer = Mutex::new(ProgressComposer::new(presets.len()));
            let (composer, tx) = (&composer, &tx);

            futures::stream::iter(presets.iter().copied().enumerate())
                .map(move |(slot, preset)| {
                    let request = HlsEncodeRequest {
                        input: input.to_path_buf(),
                        output_dir: hls_dir.join(preset.label),
                        preset,
                        segment_duration,
                        duration_secs,
                    };
                    async move {
                        let on_progress = move |local: u8| {
                            let overall = composer
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner())
                                .report(slot, local);
                            tx.send_if_modified(|current| {
                                if overall > *current {
                                    *current = overall;
                                    true
                                } else {
                                    false
                                }
                            });
                        };
                        engine.encode_hls(&request, &on_progress, cancel).await
                    }
                })
                .buffer_unordered(parallel)
                .try_collect::<Vec<_>>()
                .await
        };

        let writer = async {
            while rx.changed().await.is_ok() {
                let composed = *rx.borrow_and_update();
                recorder.record(map_encode(composed)).await;
            }
        };

        let (encoded, ()) = tokio::join!(encodes, writer);
        let playlists = encoded?;

        tracing::info!(variant_count = playlists.len(), "HLS variants generated");

        Ok(())
    }
}

/// One entry per rendition, with the bytes uploaded under its directory.
fn quality_outputs(
    asset_id: Uuid,
    presets: &[QualityPreset],
    uploaded: &[StoredObject],
) -> Vec<QualityOutput> {
    let hls_prefix = keys::hls_prefix(asset_id);
    presets
        .iter()
        .map(|preset| {
            let dir = format!("{}/{}/", hls_prefix, preset.label);
            QualityOutput {
                label: preset.label.to_string(),
                path: keys::variant_playlist_key(asset_id, preset.label),
                size_bytes: uploaded
                    .iter()
                    .filter(|object| object.key.starts_with(&dir))
                    .map(|object| object.size_bytes)
                    .sum(),
            }
        })
        .collect()
}
