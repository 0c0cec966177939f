//! Progress composition across renditions and durable progress writes.

use reelgate_core::constants::{PROGRESS_ENCODE_END, PROGRESS_HANDOFF};
use reelgate_db::AssetStateRecorder;
use std::sync::Arc;
use uuid::Uuid;

/// Combines per-rendition progress into one 0-100 value.
///
/// Each of the N slots owns an equal `100/N` share, so the overall value is
/// `floor(Σ local_i / N)`. Reports are monotonic per slot and overall, and 100 is only
/// returned once every slot has reported 100.
#[derive(Debug, Clone)]
pub struct ProgressComposer {
    slots: Vec<u8>,
    last: u8,
}

impl ProgressComposer {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![0; slot_count],
            last: 0,
        }
    }

    /// Record `local` (0-100) for `slot` and return the overall progress.
    pub fn report(&mut self, slot: usize, local: u8) -> u8 {
        if let Some(current) = self.slots.get_mut(slot) {
            *current = (*current).max(local.min(100));
        }

        if self.slots.is_empty() {
            return self.last;
        }

        let sum: u32 = self.slots.iter().map(|p| *p as u32).sum();
        let overall = (sum / self.slots.len() as u32) as u8;
        self.last = self.last.max(overall);
        self.last
    }

    pub fn current(&self) -> u8 {
        self.last
    }
}

/// Map composed encode progress (0-100) into the `10-90` window of the asset.
pub fn map_encode(progress: u8) -> u8 {
    let span = (PROGRESS_ENCODE_END - PROGRESS_HANDOFF) as u32;
    PROGRESS_HANDOFF + (progress.min(100) as u32 * span / 100) as u8
}

/// Writes strictly increasing progress values for one asset.
///
/// Each write is read back; a mismatch gets one rewrite and a warning. Write failures are
/// logged and never abort the pipeline.
pub struct ProgressRecorder {
    assets: Arc<dyn AssetStateRecorder>,
    asset_id: Uuid,
    last: Option<u8>,
}

impl ProgressRecorder {
    pub fn new(assets: Arc<dyn AssetStateRecorder>, asset_id: Uuid) -> Self {
        Self {
            assets,
            asset_id,
            last: None,
        }
    }

    /// Start from a value already stored (e.g. the hand-off progress).
    pub fn starting_at(mut self, progress: u8) -> Self {
        self.last = Some(progress);
        self
    }

    pub fn last_written(&self) -> Option<u8> {
        self.last
    }

    pub async fn record(&mut self, progress: u8) {
        let progress = progress.min(100);
        if self.last.is_some_and(|last| progress <= last) {
            return;
        }

        match self.assets.update_progress(self.asset_id, progress).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(asset_id = %self.asset_id, progress = progress, "Asset no longer processing, progress not written");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    asset_id = %self.asset_id,
                    progress = progress,
                    error = %e,
                    "Failed to persist processing progress"
                );
                return;
            }
        }
        self.last = Some(progress);

        let stored = match self.assets.get_asset(self.asset_id).await {
            Ok(Some(asset)) => asset.processing_progress,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(asset_id = %self.asset_id, error = %e, "Progress read-back failed");
                return;
            }
        };

        if stored != progress {
            tracing::warn!(
                asset_id = %self.asset_id,
                expected = progress,
                stored = stored,
                "Progress read-back mismatch, rewriting once"
            );
            if let Err(e) = self.assets.update_progress(self.asset_id, progress).await {
                tracing::warn!(asset_id = %self.asset_id, error = %e, "Progress rewrite failed");
            }
        }
    }
}
