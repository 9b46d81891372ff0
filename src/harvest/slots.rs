use tracing::trace;

use crate::adapter::{AdapterError, RenderAdapter};
use crate::harvest::segment::Segment;
use crate::harvest::view::RenderView;

/// Outcome of scanning one segment's slot range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentScan {
    /// Indices confirmed present, ascending, starting at the scan origin.
    pub present: Vec<u32>,

    /// Highest index confirmed present during this scan, if any. This (not
    /// the index where scanning stopped) becomes the new watermark, so a
    /// trailing run of misses is re-probed next cycle instead of being
    /// silently skipped.
    pub watermark: Option<u32>,
}

/// Probe a segment's slots from `start_index`, tolerating short gaps.
///
/// The surface's virtualization can leave an index unrendered without the
/// segment having ended, so a miss only ends the scan once more than
/// `gap_tolerance` consecutive indices are absent. With `gap_tolerance = 0`
/// the first miss stops the scan.
pub async fn scan_from<A: RenderAdapter>(
    view: &RenderView<'_, A>,
    segment: &Segment,
    start_index: u32,
    gap_tolerance: u32,
) -> Result<SegmentScan, AdapterError> {
    let mut present = Vec::new();
    let mut watermark = None;
    let mut misses: u32 = 0;
    let mut index = start_index;

    while misses <= gap_tolerance {
        match view.slot_root(segment, index).await? {
            Some(_) => {
                trace!(segment = segment.id(), slot = index, "slot present");
                present.push(index);
                watermark = Some(index);
                misses = 0;
            }
            None => {
                trace!(segment = segment.id(), slot = index, "slot absent");
                misses += 1;
            }
        }
        index += 1;
    }

    Ok(SegmentScan { present, watermark })
}
