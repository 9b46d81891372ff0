use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::harvest::segment::Segment;

/// Mutable per-run bookkeeping for one harvest.
///
/// Owned exclusively by its run; watermarks and the visited list only ever
/// grow, so the same slot is never processed twice.
#[derive(Debug, Default)]
pub struct HarvestState {
    /// Segment ids in discovery order.
    visited: Vec<String>,

    /// Highest slot index fully processed per segment. A segment with no
    /// processed slot has no entry.
    watermarks: HashMap<String, u32>,

    /// Consecutive cycles that yielded zero newly-accepted records.
    pub dead_cycles: u32,

    /// Total records accepted, mirrored from the accumulator each cycle.
    pub total: usize,

    /// Cycles executed so far.
    pub cycles: u64,
}

impl HarvestState {
    /// Record any newly discovered segments, preserving discovery order.
    pub fn note_segments(&mut self, segments: &[Segment]) {
        for segment in segments {
            if !self.visited.iter().any(|id| id == segment.id()) {
                self.visited.push(segment.id().to_string());
            }
        }
    }

    /// Watermark for a segment, if any slot of it was ever processed.
    pub fn watermark(&self, segment_id: &str) -> Option<u32> {
        self.watermarks.get(segment_id).copied()
    }

    /// First unprocessed index for a segment.
    pub fn scan_start(&self, segment_id: &str) -> u32 {
        self.watermark(segment_id).map_or(0, |w| w + 1)
    }

    /// Raise a segment's watermark. Watermarks never move backwards.
    pub fn advance_watermark(&mut self, segment_id: &str, index: u32) {
        let entry = self.watermarks.entry(segment_id.to_string()).or_insert(index);
        if *entry < index {
            *entry = index;
        }
    }

    /// Restore watermarks and visited order from a checkpoint.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        for segment in &checkpoint.segments {
            self.visited.push(segment.id.clone());
            self.watermarks.insert(segment.id.clone(), segment.watermark);
        }
        self.total = checkpoint.total;
        debug!(
            "Restored checkpoint: {} segment(s), {} seen key(s), total {}",
            checkpoint.segments.len(),
            checkpoint.seen_keys.len(),
            checkpoint.total
        );
    }

    /// Snapshot the resumable portion of this state.
    pub fn checkpoint(&self, seen_keys: Vec<String>) -> Checkpoint {
        let segments = self
            .visited
            .iter()
            .filter_map(|id| {
                self.watermarks.get(id).map(|&watermark| SegmentWatermark {
                    id: id.clone(),
                    watermark,
                })
            })
            .collect();

        Checkpoint {
            segments,
            seen_keys,
            total: self.total,
        }
    }
}

/// Stop the harvest when the limit is reached or the feed stopped growing.
///
/// `limit = 0` disables the first condition; either condition suffices.
pub fn should_stop(state: &HarvestState, limit: usize, max_dead_cycles: u32) -> bool {
    if limit > 0 && state.total >= limit {
        return true;
    }
    state.dead_cycles >= max_dead_cycles
}

/// Watermark entry for one segment inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentWatermark {
    pub id: String,
    pub watermark: u32,
}

/// Resumable snapshot of a harvest run, written after every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Checkpoint {
    pub segments: Vec<SegmentWatermark>,
    pub seen_keys: Vec<String>,
    pub total: usize,
}

impl Checkpoint {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read checkpoint file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .context(format!("Failed to parse checkpoint file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize checkpoint")?;
        fs::write(path, contents)
            .context(format!("Failed to write checkpoint file: {}", path.display()))?;

        debug!("Checkpoint written to {}", path.display());
        Ok(())
    }
}
