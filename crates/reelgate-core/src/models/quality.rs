use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::AppError;

/// One HLS rendition target: resolution plus video and audio bitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityPreset {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

/// Supported presets, ordered low to high.
pub const QUALITY_PRESETS: [QualityPreset; 4] = [
    QualityPreset {
        label: "360p",
        width: 640,
        height: 360,
        video_bitrate_kbps: 800,
        audio_bitrate_kbps: 96,
    },
    QualityPreset {
        label: "480p",
        width: 854,
        height: 480,
        video_bitrate_kbps: 1400,
        audio_bitrate_kbps: 128,
    },
    QualityPreset {
        label: "720p",
        width: 1280,
        height: 720,
        video_bitrate_kbps: 2800,
        audio_bitrate_kbps: 128,
    },
    QualityPreset {
        label: "1080p",
        width: 1920,
        height: 1080,
        video_bitrate_kbps: 5000,
        audio_bitrate_kbps: 192,
    },
];

impl QualityPreset {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Peak bandwidth advertised in the master playlist, in bits per second.
    pub fn bandwidth_bps(&self) -> u64 {
        (self.video_bitrate_kbps as u64 + self.audio_bitrate_kbps as u64) * 1000
    }

    /// Resolve a list of labels into presets, deduplicated and sorted low to high.
    pub fn resolve_all<S: AsRef<str>>(labels: &[S]) -> Result<Vec<QualityPreset>, AppError> {
        let mut presets = labels
            .iter()
            .map(|label| label.as_ref().parse::<QualityPreset>())
            .collect::<Result<Vec<_>, _>>()?;
        presets.sort_by_key(|p| p.height);
        presets.dedup_by_key(|p| p.label);
        Ok(presets)
    }
}

impl FromStr for QualityPreset {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        QUALITY_PRESETS
            .iter()
            .find(|p| p.label == wanted)
            .copied()
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Unknown quality '{}'. Must be one of: 360p, 480p, 720p, 1080p",
                    s
                ))
            })
    }
}

impl Display for QualityPreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup_is_case_insensitive() {
        let preset: QualityPreset = "720P".parse().unwrap();
        assert_eq!(preset.width, 1280);
        assert_eq!(preset.resolution(), "1280x720");
    }

    #[test]
    fn test_360p_bandwidth_includes_audio() {
        let preset: QualityPreset = "360p".parse().unwrap();
        assert_eq!(preset.bandwidth_bps(), 896_000);
    }

    #[test]
    fn test_resolve_all_sorts_and_dedups() {
        let presets = QualityPreset::resolve_all(&["720p", "360p", "720p"]).unwrap();
        let labels: Vec<_> = presets.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec!["360p", "720p"]);
    }

    #[test]
    fn test_unknown_quality_rejected() {
        assert!(matches!(
            QualityPreset::resolve_all(&["4k"]),
            Err(AppError::InvalidInput(_))
        ));
    }
}
