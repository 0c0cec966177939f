//! Filename handling for uploaded videos.
//!
//! Stored names are derived from the client's filename: accents are stripped (NFD, then
//! combining marks dropped), every other run of characters outside `[A-Za-z0-9_-]`
//! collapses to a single `_`, and the lowercase extension is preserved.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::AppError;

const MAX_STEM_LEN: usize = 200;
const FALLBACK_STEM: &str = "video";

/// Lowercase extension after the last `.`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    let base = base_name(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    let ext = ext.trim().to_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Check the extension against an allow-list of lowercase extensions.
pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<String, AppError> {
    match extension_of(filename) {
        Some(ext) if allowed.iter().any(|a| a == &ext) => Ok(ext),
        Some(ext) => Err(AppError::UnsupportedFormat(format!(
            ".{} is not allowed. Allowed formats: {}",
            ext,
            allowed.join(", ")
        ))),
        None => Err(AppError::UnsupportedFormat(format!(
            "'{}' has no extension. Allowed formats: {}",
            filename,
            allowed.join(", ")
        ))),
    }
}

/// Sanitize the part of a filename before its extension.
pub fn sanitize_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut pending_sep = false;

    for c in stem.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
        if out.len() >= MAX_STEM_LEN {
            break;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{sanitized_stem}.{ext}` for the client's filename.
pub fn sanitize_filename(filename: &str) -> String {
    let base = base_name(filename);
    match (base.rsplit_once('.'), extension_of(base)) {
        (Some((stem, _)), Some(ext)) => format!("{}.{}", sanitize_stem(stem), ext),
        _ => sanitize_stem(base),
    }
}

/// Name of the reassembled file: `{timestamp_ms}_{sanitized_stem}.{ext}`.
pub fn assembled_file_name(filename: &str, timestamp_ms: i64) -> String {
    format!("{}_{}", timestamp_ms, sanitize_filename(filename))
}

fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<String> {
        ["mp4", "mov", "mkv"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(validate_extension("Clip.MP4", &formats()).unwrap(), "mp4");
    }

    #[test]
    fn test_disallowed_extension_rejected() {
        assert!(matches!(
            validate_extension("setup.exe", &formats()),
            Err(AppError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            validate_extension("noextension", &formats()),
            Err(AppError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_only_last_dot_counts() {
        assert_eq!(extension_of("archive.mp4.exe").as_deref(), Some("exe"));
    }

    #[test]
    fn test_accents_stripped() {
        assert_eq!(sanitize_filename("Présentation été.mov"), "Presentation_ete.mov");
    }

    #[test]
    fn test_separators_collapse() {
        assert_eq!(sanitize_filename("my  video (final)!!.MKV"), "my_video_final.mkv");
    }

    #[test]
    fn test_path_components_dropped() {
        assert_eq!(sanitize_filename("../../etc/clip.mp4"), "clip.mp4");
        assert_eq!(sanitize_filename("C:\\Users\\me\\clip.mp4"), "clip.mp4");
    }

    #[test]
    fn test_empty_stem_falls_back() {
        assert_eq!(sanitize_filename("日本.mp4"), "video.mp4");
    }

    #[test]
    fn test_assembled_name_has_timestamp_prefix() {
        assert_eq!(
            assembled_file_name("Été 2024.mp4", 1_700_000_000_000),
            "1700000000000_Ete_2024.mp4"
        );
    }
}
