use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterError, Locator, RenderAdapter};
use crate::harvest::segment::Segment;

/// Templates for addressing segments and slots on the rendered surface.
///
/// The scheme only assembles locator strings; their syntax is meaningful to
/// the adapter alone. Slot indices are 0-based in the core and mapped to the
/// source's 1-based child positions here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorScheme {
    /// Locator prefix below which segment buckets are rendered.
    pub segment_base: String,

    /// Child ordinal of the first (newest) segment under the base.
    pub first_segment_ordinal: u32,

    /// Inner-layout variants to try per segment. The newest bucket tends to
    /// nest one level differently from older ones, so each ordinal is probed
    /// against every variant in order.
    pub segment_inner_variants: Vec<u32>,

    /// Suffix that resolves only when a slot position is actually occupied.
    pub slot_probe_suffix: String,
}

impl Default for LocatorScheme {
    fn default() -> Self {
        Self {
            segment_base: concat!(
                "/html/body/div[1]/div/div/div/div/div/div/div[1]/div/div/div",
                "/div[5]/div[2]"
            )
            .to_string(),
            first_segment_ordinal: 2,
            segment_inner_variants: vec![4, 3],
            slot_probe_suffix: "/div".to_string(),
        }
    }
}

impl LocatorScheme {
    /// Locator prefix for one segment candidate.
    pub fn segment_prefix(&self, ordinal: u32, inner: u32) -> Locator {
        Locator::new(format!(
            "{}/div[{}]/div[{}]/div[1]",
            self.segment_base, ordinal, inner
        ))
    }

    /// Locator for the slot at `index` (0-based) within a segment.
    pub fn slot(&self, segment: &Segment, index: u32) -> Locator {
        segment
            .prefix()
            .join(&format!("/div[{}]{}", index + 1, self.slot_probe_suffix))
    }
}

/// One logical snapshot of the rendered surface.
///
/// Captured once per harvest cycle and handed to both the segment
/// discoverer and the slot counter, so the two always address the same
/// render state and tests can substitute a synthetic surface.
pub struct RenderView<'a, A: RenderAdapter> {
    adapter: &'a A,
    scheme: &'a LocatorScheme,
}

impl<'a, A: RenderAdapter> RenderView<'a, A> {
    pub fn new(adapter: &'a A, scheme: &'a LocatorScheme) -> Self {
        Self { adapter, scheme }
    }

    pub fn adapter(&self) -> &A {
        self.adapter
    }

    pub fn scheme(&self) -> &LocatorScheme {
        self.scheme
    }

    /// Root node of a slot, or `None` while the position is unrendered.
    pub async fn slot_root(
        &self,
        segment: &Segment,
        index: u32,
    ) -> Result<Option<A::Node>, AdapterError> {
        self.adapter.query_one(&self.scheme.slot(segment, index)).await
    }

    /// Locator of a slot, for composing field lookups below it.
    pub fn slot_locator(&self, segment: &Segment, index: u32) -> Locator {
        self.scheme.slot(segment, index)
    }
}
