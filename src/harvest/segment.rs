use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::{AdapterError, Locator, RenderAdapter};
use crate::harvest::view::RenderView;

/// One ordered content bucket within the feed.
///
/// A segment's identity is its locator prefix, which is assumed stable once
/// discovered; segments are only ever appended to the visited list, never
/// renamed or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    ordinal: u32,
    prefix: Locator,
}

impl Segment {
    pub fn new(ordinal: u32, prefix: Locator) -> Self {
        Self { ordinal, prefix }
    }

    /// Stable identity usable as a watermark key.
    pub fn id(&self) -> &str {
        self.prefix.as_str()
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn prefix(&self) -> &Locator {
        &self.prefix
    }
}

/// Enumerates the segments currently present on a render view.
///
/// Probing walks segment ordinals upward from the configured first ordinal
/// and stops at the first ordinal with no recognizable bucket, so the
/// returned list is newest-first and its prefix is stable across repeated
/// calls against the same view.
pub struct SegmentDiscoverer {
    /// Upper bound on probed ordinals, guarding against a pathological
    /// surface that resolves every candidate.
    max_segments: u32,
}

impl Default for SegmentDiscoverer {
    fn default() -> Self {
        Self { max_segments: 256 }
    }
}

impl SegmentDiscoverer {
    pub fn new(max_segments: u32) -> Self {
        Self { max_segments }
    }

    /// All segments on the current view, newest first.
    ///
    /// Idempotent within a cycle: without an intervening scroll, two calls
    /// return the same ordered list.
    pub async fn discover<A: RenderAdapter>(
        &self,
        view: &RenderView<'_, A>,
    ) -> Result<Vec<Segment>, AdapterError> {
        let scheme = view.scheme();
        let mut segments = Vec::new();
        let mut ordinal = scheme.first_segment_ordinal;

        while ordinal < scheme.first_segment_ordinal + self.max_segments {
            let mut found = None;

            // The newest bucket nests differently from older ones; try each
            // configured inner layout until one resolves a first slot.
            for &inner in &scheme.segment_inner_variants {
                let prefix = scheme.segment_prefix(ordinal, inner);
                let candidate = Segment::new(ordinal, prefix);
                if view.slot_root(&candidate, 0).await?.is_some() {
                    found = Some(candidate);
                    break;
                }
            }

            match found {
                Some(segment) => {
                    segments.push(segment);
                    ordinal += 1;
                }
                None => break,
            }
        }

        debug!("Discovered {} segment(s)", segments.len());
        Ok(segments)
    }
}
