//! Content types for the objects the pipeline writes.

use std::path::Path;

pub const HLS_PLAYLIST: &str = "application/vnd.apple.mpegurl";
pub const MPEG_TS: &str = "video/mp2t";
pub const JPEG: &str = "image/jpeg";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type derived from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    content_type_for_extension(&ext)
}

pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext {
        "m3u8" => HLS_PLAYLIST,
        "ts" => MPEG_TS,
        "jpg" | "jpeg" => JPEG,
        "png" => "image/png",
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hls_types() {
        assert_eq!(content_type_for(Path::new("hls/360p/playlist.m3u8")), HLS_PLAYLIST);
        assert_eq!(content_type_for(Path::new("segment_000.TS")), MPEG_TS);
        assert_eq!(content_type_for(Path::new("README")), OCTET_STREAM);
    }
}
