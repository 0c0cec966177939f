//! Shared constants for object keys and scratch files.

/// Root prefix of every per-asset object key.
pub const VIDEO_KEY_PREFIX: &str = "videos";

/// Object name of the extracted thumbnail inside an asset's prefix.
pub const THUMBNAIL_FILE_NAME: &str = "thumbnail.jpg";

/// Name of the HLS output directory, locally and in object storage.
pub const HLS_DIR_NAME: &str = "hls";

/// Master playlist file name inside the HLS directory.
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";

/// Per-rendition playlist file name.
pub const VARIANT_PLAYLIST_NAME: &str = "playlist.m3u8";

/// FFmpeg segment filename pattern for each rendition.
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

/// Raw chunk files are named `chunk_{index:06}` inside a session's scratch dir.
pub const CHUNK_FILE_PREFIX: &str = "chunk_";

/// Object metadata keys attached to the uploaded original.
pub const META_OWNER_ID: &str = "owner-id";
pub const META_ORIGINAL_FILENAME: &str = "original-filename";

/// Owner recorded when the client does not send one.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Progress value persisted once the upload is handed off to transcoding.
pub const PROGRESS_HANDOFF: u8 = 10;

/// Upper bound of the thumbnail + HLS progress window.
pub const PROGRESS_ENCODE_END: u8 = 90;
