//! Transcoding engine adapter: ffprobe metadata, thumbnail extraction and HLS encoding.

use async_trait::async_trait;
use reelgate_core::constants::{SEGMENT_PATTERN, THUMBNAIL_FILE_NAME, VARIANT_PLAYLIST_NAME};
use reelgate_core::models::{QualityPreset, VideoMetadata};
use reelgate_core::AppError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::metadata::parse_probe_output;

const STDERR_TAIL_BYTES: usize = 2048;

/// Everything needed to encode one HLS rendition.
#[derive(Debug, Clone)]
pub struct HlsEncodeRequest {
    pub input: PathBuf,
    /// Rendition directory; receives `playlist.m3u8` and `segment_%03d.ts`
    pub output_dir: PathBuf,
    pub preset: QualityPreset,
    pub segment_duration: u64,
    /// Probed duration of the input, used to turn encoder time into a percentage
    pub duration_secs: f64,
}

/// Media operations the pipeline needs from a transcoder.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    async fn probe_metadata(&self, path: &Path) -> Result<VideoMetadata, AppError>;

    /// Extract one frame at `offset_secs` into `output_dir`; returns the image path
    async fn extract_thumbnail(
        &self,
        path: &Path,
        output_dir: &Path,
        offset_secs: f64,
    ) -> Result<PathBuf, AppError>;

    /// Encode one rendition. `on_progress` receives 0-99 while running and 100 on success.
    /// Cancelling `cancel` stops the encoder and returns `AppError::Cancelled`.
    async fn encode_hls(
        &self,
        request: &HlsEncodeRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AppError>;
}

/// Validate that a binary path doesn't contain shell metacharacters or traversal
pub fn validate_binary_path(path: &str) -> Result<(), AppError> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.is_empty() || path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(AppError::InvalidInput(format!(
            "Binary path contains dangerous characters: {}",
            path
        )));
    }

    if path.contains("..") {
        return Err(AppError::InvalidInput(format!(
            "Binary path contains directory traversal: {}",
            path
        )));
    }

    if !path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\')
    {
        return Err(AppError::InvalidInput(format!(
            "Binary path contains unsafe characters: {}",
            path
        )));
    }

    Ok(())
}

/// One key/value pair of ffmpeg's `-progress` output that matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Encoded media time in microseconds
    OutTime(u64),
    End,
}

/// Turns one rendition's `-progress` lines into increasing 0-99 reports.
struct ProgressTracker {
    duration_secs: f64,
    last_reported: Option<u8>,
}

impl ProgressTracker {
    fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            last_reported: None,
        }
    }

    /// Returns false once ffmpeg reports `progress=end`
    fn feed(&mut self, line: &str, on_progress: &(dyn Fn(u8) + Send + Sync)) -> bool {
        match parse_progress_line(line) {
            Some(ProgressEvent::OutTime(us)) => {
                let percent = percent_of(us, self.duration_secs);
                if self.last_reported.map_or(true, |last| percent > last) {
                    self.last_reported = Some(percent);
                    on_progress(percent);
                }
                true
            }
            Some(ProgressEvent::End) => false,
            None => true,
        }
    }
}

/// Parse a `-progress pipe:1` line.
///
/// ffmpeg reports `out_time_ms` in microseconds as well, so both keys are read the same way.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.trim().parse::<u64>().ok().map(ProgressEvent::OutTime),
        "progress" if value.trim() == "end" => Some(ProgressEvent::End),
        _ => None,
    }
}

/// Percentage of `duration_secs` covered by `out_time_us`, capped at 99.
pub fn percent_of(out_time_us: u64, duration_secs: f64) -> u8 {
    if duration_secs <= 0.0 {
        return 0;
    }
    let ratio = out_time_us as f64 / (duration_secs * 1_000_000.0);
    (ratio * 100.0).floor().clamp(0.0, 99.0) as u8
}

/// FFmpeg/ffprobe backed engine
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: String, ffprobe_path: String) -> Result<Self, AppError> {
        validate_binary_path(&ffmpeg_path)?;
        validate_binary_path(&ffprobe_path)?;
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    fn hls_args(request: &HlsEncodeRequest, playlist_path: &Path) -> Vec<String> {
        let preset = &request.preset;
        let segment_pattern = request.output_dir.join(SEGMENT_PATTERN);

        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-i".to_string(),
            request.input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "fast".to_string(),
            "-profile:v".to_string(),
            "main".to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", preset.width, preset.height),
            "-b:v".to_string(),
            format!("{}k", preset.video_bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", (preset.video_bitrate_kbps as f32 * 1.2) as u32),
            "-bufsize".to_string(),
            format!("{}k", preset.video_bitrate_kbps * 2),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", preset.audio_bitrate_kbps),
            "-ac".to_string(),
            "2".to_string(),
            "-ar".to_string(),
            "48000".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            request.segment_duration.to_string(),
            "-hls_playlist_type".to_string(),
            "vod".to_string(),
            "-hls_segment_filename".to_string(),
            segment_pattern.to_string_lossy().to_string(),
            playlist_path.to_string_lossy().to_string(),
        ]
    }

    async fn canonical_input(path: &Path) -> Result<PathBuf, AppError> {
        tokio::fs::canonicalize(path).await.map_err(|e| {
            AppError::EncodingFailed(format!("Input {} is not readable: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    #[tracing::instrument(skip(self), fields(ffmpeg.operation = "probe"))]
    async fn probe_metadata(&self, path: &Path) -> Result<VideoMetadata, AppError> {
        let start = std::time::Instant::now();
        let input = Self::canonical_input(path).await?;
        let size_bytes = tokio::fs::metadata(&input).await?.len();

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(&input)
            .output()
            .await
            .map_err(|e| AppError::EncodingFailed(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::EncodingFailed(format!(
                "ffprobe failed: {}",
                stderr_tail(&output.stderr)
            )));
        }

        let metadata = parse_probe_output(&output.stdout, size_bytes)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            video_duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            codec = %metadata.codec,
            "Video probe completed"
        );

        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(ffmpeg.operation = "thumbnail"))]
    async fn extract_thumbnail(
        &self,
        path: &Path,
        output_dir: &Path,
        offset_secs: f64,
    ) -> Result<PathBuf, AppError> {
        let input = Self::canonical_input(path).await?;
        tokio::fs::create_dir_all(output_dir).await?;
        let output_path = output_dir.join(THUMBNAIL_FILE_NAME);

        let output = Command::new(&self.ffmpeg_path)
            .args(["-y", "-hide_banner", "-ss"])
            .arg(format!("{:.3}", offset_secs.max(0.0)))
            .arg("-i")
            .arg(&input)
            .args(["-frames:v", "1", "-q:v", "2"])
            .arg(&output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::EncodingFailed(format!("Failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::EncodingFailed(format!(
                "Thumbnail extraction failed: {}",
                stderr_tail(&output.stderr)
            )));
        }

        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(AppError::EncodingFailed(format!(
                "ffmpeg produced no frame at {:.3}s",
                offset_secs
            )));
        }

        Ok(output_path)
    }

    #[tracing::instrument(
        skip(self, request, on_progress, cancel),
        fields(ffmpeg.operation = "hls", quality = %request.preset.label)
    )]
    async fn encode_hls(
        &self,
        request: &HlsEncodeRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AppError> {
        let start = std::time::Instant::now();
        tokio::fs::create_dir_all(&request.output_dir).await?;
        let playlist_path = request.output_dir.join(VARIANT_PLAYLIST_NAME);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(Self::hls_args(request, &playlist_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::EncodingFailed(format!("Failed to spawn ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::EncodingFailed("ffmpeg stdout not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_tail(stderr)));

        let mut lines = BufReader::new(stdout).lines();
        let mut progress = ProgressTracker::new(request.duration_secs);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill ffmpeg after cancellation");
                    }
                    return Err(AppError::Cancelled(format!(
                        "Encoding {} cancelled",
                        request.preset.label
                    )));
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !progress.feed(&line, on_progress) {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read ffmpeg progress");
                            break;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill ffmpeg after cancellation");
                }
                return Err(AppError::Cancelled(format!(
                    "Encoding {} cancelled",
                    request.preset.label
                )));
            }
            status = child.wait() => status
                .map_err(|e| AppError::EncodingFailed(format!("Failed to wait for ffmpeg: {}", e)))?,
        };

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(AppError::EncodingFailed(format!(
                "FFmpeg failed for {} ({}): {}",
                request.preset.label, status, stderr
            )));
        }

        on_progress(100);

        tracing::info!(
            quality = %request.preset.label,
            duration_ms = start.elapsed().as_millis() as u64,
            "HLS rendition encoded"
        );

        Ok(playlist_path)
    }
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        tracing::debug!(error = %e, "Failed to read ffmpeg stderr");
    }
    stderr_tail(&buf)
}

/// Last bytes of stderr, where ffmpeg prints the actual failure
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut cut = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &text[cut..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_lines() {
        assert_eq!(
            parse_progress_line("out_time_us=5000000"),
            Some(ProgressEvent::OutTime(5_000_000))
        );
        assert_eq!(
            parse_progress_line("out_time_ms=2500000"),
            Some(ProgressEvent::OutTime(2_500_000))
        );
        assert_eq!(parse_progress_line("progress=end"), Some(ProgressEvent::End));
        assert_eq!(parse_progress_line("progress=continue"), None);
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("frame=120"), None);
    }

    #[test]
    fn test_progress_tracker_reports_increases_until_end() {
        let reported = Mutex::new(Vec::new());
        let on_progress = |p: u8| reported.lock().unwrap().push(p);
        let mut tracker = ProgressTracker::new(10.0);

        let lines = [
            "frame=10",
            "out_time_us=2500000",
            "progress=continue",
            "out_time_us=2500000",
            "out_time_us=1000000",
            "out_time_us=9990000",
        ];
        for line in lines {
            assert!(tracker.feed(line, &on_progress));
        }
        assert!(!tracker.feed("progress=end", &on_progress));

        assert_eq!(*reported.lock().unwrap(), vec![25, 99]);
    }

    #[test]
    fn test_percent_is_capped_below_completion() {
        assert_eq!(percent_of(5_000_000, 10.0), 50);
        assert_eq!(percent_of(10_000_000, 10.0), 99);
        assert_eq!(percent_of(12_000_000, 10.0), 99);
        assert_eq!(percent_of(1_000, 0.0), 0);
    }

    #[test]
    fn test_binary_path_validation() {
        assert!(validate_binary_path("/usr/bin/ffmpeg").is_ok());
        assert!(validate_binary_path("ffprobe").is_ok());
        assert!(validate_binary_path("ffmpeg; rm -rf /").is_err());
        assert!(validate_binary_path("../bin/ffmpeg").is_err());
        assert!(validate_binary_path("").is_err());
        assert!(FfmpegEngine::new("ffmpeg".into(), "$(whoami)".into()).is_err());
    }

    #[test]
    fn test_hls_args_use_preset() {
        let request = HlsEncodeRequest {
            input: PathBuf::from("/in.mp4"),
            output_dir: PathBuf::from("/out/720p"),
            preset: "720p".parse().unwrap(),
            segment_duration: 10,
            duration_secs: 12.0,
        };
        let args = FfmpegEngine::hls_args(&request, Path::new("/out/720p/playlist.m3u8"));
        let joined = args.join(" ");

        assert!(joined.contains("-progress pipe:1 -nostats") || joined.contains("-nostats -progress pipe:1"));
        assert!(joined.contains("scale=1280:720"));
        assert!(joined.contains("-b:v 2800k"));
        assert!(joined.contains("-b:a 128k"));
        assert!(joined.contains("-hls_time 10"));
        assert!(joined.contains("/out/720p/segment_%03d.ts"));
        assert!(joined.ends_with("/out/720p/playlist.m3u8"));
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = "x".repeat(STDERR_TAIL_BYTES + 10);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert_eq!(tail.len(), STDERR_TAIL_BYTES + 3);
    }
}
