//! ffprobe output parsing.

use reelgate_core::models::VideoMetadata;
use reelgate_core::AppError;

/// Parse `ffprobe -print_format json -show_format -show_streams -select_streams v:0`.
pub fn parse_probe_output(stdout: &[u8], size_bytes: u64) -> Result<VideoMetadata, AppError> {
    let probe_data: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| AppError::EncodingFailed(format!("Failed to parse ffprobe output: {}", e)))?;

    let stream = probe_data["streams"]
        .get(0)
        .ok_or_else(|| AppError::EncodingFailed("No video stream found".to_string()))?;

    let format = &probe_data["format"];

    let duration = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| stream["duration"].as_str().and_then(|d| d.parse::<f64>().ok()))
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AppError::EncodingFailed("Could not parse duration".to_string()))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| AppError::EncodingFailed("Could not parse width".to_string()))?
        as u32;

    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| AppError::EncodingFailed("Could not parse height".to_string()))?
        as u32;

    let codec = stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok());

    let fps = stream["r_frame_rate"]
        .as_str()
        .or_else(|| stream["avg_frame_rate"].as_str())
        .and_then(parse_frame_rate);

    Ok(VideoMetadata {
        duration,
        width,
        height,
        bitrate,
        codec,
        fps,
        size_bytes,
    })
}

/// `"30000/1001"` → 29.97
fn parse_frame_rate(rate: &str) -> Option<f32> {
    let (num, den) = rate.split_once('/')?;
    let num: f32 = num.trim().parse().ok()?;
    let den: f32 = den.trim().parse().ok()?;
    if den != 0.0 {
        Some(num / den)
    } else {
        None
    }
}
