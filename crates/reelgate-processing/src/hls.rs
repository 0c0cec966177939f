//! HLS playlist synthesis and URL rewriting.

use regex::{Captures, Regex};
use reelgate_core::constants::VARIANT_PLAYLIST_NAME;
use reelgate_core::models::QualityPreset;
use reelgate_core::AppError;
use std::path::{Path, PathBuf};

fn uri_attribute() -> Result<Regex, AppError> {
    Regex::new(r#"URI="([^"]*)""#)
        .map_err(|e| AppError::Internal(format!("Failed to compile URI attribute regex: {}", e)))
}

/// Master playlist referencing one `{label}/playlist.m3u8` per rendition.
pub fn master_playlist(presets: &[QualityPreset]) -> String {
    let mut content = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");

    for preset in presets {
        content.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}/{}\n",
            preset.bandwidth_bps(),
            preset.resolution(),
            preset.label,
            VARIANT_PLAYLIST_NAME
        ));
    }

    content
}

/// A reference with a scheme (`https://...`, `data:...`) is left untouched.
pub fn is_absolute(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn absolutize(reference: &str, base_url: &str) -> String {
    if is_absolute(reference) {
        return reference.to_string();
    }
    let relative = reference.trim_start_matches("./").trim_start_matches('/');
    format!("{}/{}", base_url.trim_end_matches('/'), relative)
}

/// Rewrite every relative URI line and `URI="..."` attribute against `base_url`,
/// the public URL of the directory holding the playlist.
pub fn rewrite_playlist(content: &str, base_url: &str) -> Result<String, AppError> {
    let uri_attribute = uri_attribute()?;
    let mut rewritten = String::with_capacity(content.len() + 64);

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            rewritten.push_str(line);
        } else if trimmed.starts_with('#') {
            let replaced = uri_attribute.replace_all(line, |caps: &Captures| {
                format!("URI=\"{}\"", absolutize(&caps[1], base_url))
            });
            rewritten.push_str(&replaced);
        } else {
            rewritten.push_str(&absolutize(trimmed, base_url));
        }
        rewritten.push('\n');
    }

    Ok(rewritten)
}

/// Rewrite every `.m3u8` under `root` in place.
///
/// `base_url` is the public URL of `root` itself; a playlist in `root/720p/` is rewritten
/// against `{base_url}/720p`. Returns the rewritten files.
pub async fn rewrite_tree(root: &Path, base_url: &str) -> Result<Vec<PathBuf>, AppError> {
    let root = root.to_path_buf();
    let base_url = base_url.trim_end_matches('/').to_string();

    let playlists = tokio::task::spawn_blocking(move || -> Result<Vec<(PathBuf, String)>, AppError> {
        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| AppError::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("m3u8")
            {
                continue;
            }

            let dir_url = match path.parent().and_then(|p| p.strip_prefix(&root).ok()) {
                Some(relative) if !relative.as_os_str().is_empty() => {
                    let segments = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    format!("{}/{}", base_url, segments)
                }
                _ => base_url.clone(),
            };
            found.push((path.to_path_buf(), dir_url));
        }
        Ok(found)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Playlist walk task failed: {}", e)))??;

    let mut rewritten = Vec::with_capacity(playlists.len());
    for (path, dir_url) in playlists {
        let content = tokio::fs::read_to_string(&path).await?;
        tokio::fs::write(&path, rewrite_playlist(&content, &dir_url)?).await?;
        rewritten.push(path);
    }

    tracing::debug!(playlists = rewritten.len(), "Rewrote playlist URLs");

    Ok(rewritten)
}

/// True when `content` still holds a URI line or attribute without a scheme.
pub fn has_relative_references(content: &str) -> bool {
    let Ok(uri_attribute) = uri_attribute() else {
        return true;
    };
    content.lines().map(str::trim).any(|line| {
        if line.is_empty() {
            false
        } else if line.starts_with('#') {
            uri_attribute
                .captures_iter(line)
                .any(|caps| !is_absolute(&caps[1]))
        } else {
            !is_absolute(line)
        }
    })
}
