//! Reelgate processing
//!
//! The FFmpeg adapter, HLS playlist handling, progress composition and the pipeline
//! that turns a reassembled upload into a ready HLS asset.

pub mod ffmpeg;
pub mod hls;
pub mod metadata;
pub mod pipeline;
pub mod progress;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use ffmpeg::{FfmpegEngine, HlsEncodeRequest, TranscodeEngine};
pub use pipeline::{PipelineConfig, VideoPipeline};
pub use progress::{map_encode, ProgressComposer, ProgressRecorder};
