//! Object key layout.
//!
//! ```text
//! videos/{asset_id}/original/{file}
//! videos/{asset_id}/thumbnail.jpg
//! videos/{asset_id}/hls/master.m3u8
//! videos/{asset_id}/hls/{quality}/playlist.m3u8 + segments
//! ```

use crate::traits::{StorageError, StorageResult};
use reelgate_core::constants::{
    HLS_DIR_NAME, MASTER_PLAYLIST_NAME, THUMBNAIL_FILE_NAME, VARIANT_PLAYLIST_NAME,
    VIDEO_KEY_PREFIX,
};
use uuid::Uuid;

pub fn asset_prefix(asset_id: Uuid) -> String {
    format!("{}/{}", VIDEO_KEY_PREFIX, asset_id)
}

pub fn original_key(asset_id: Uuid, file_name: &str) -> String {
    format!("{}/original/{}", asset_prefix(asset_id), file_name)
}

pub fn thumbnail_key(asset_id: Uuid) -> String {
    format!("{}/{}", asset_prefix(asset_id), THUMBNAIL_FILE_NAME)
}

pub fn hls_prefix(asset_id: Uuid) -> String {
    format!("{}/{}", asset_prefix(asset_id), HLS_DIR_NAME)
}

pub fn master_playlist_key(asset_id: Uuid) -> String {
    format!("{}/{}", hls_prefix(asset_id), MASTER_PLAYLIST_NAME)
}

pub fn variant_playlist_key(asset_id: Uuid, quality: &str) -> String {
    format!("{}/{}/{}", hls_prefix(asset_id), quality, VARIANT_PLAYLIST_NAME)
}

/// Reject keys that are empty, absolute or contain traversal segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') || key.split('/').any(|s| s == "..") {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}
