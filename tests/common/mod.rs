//! Scripted in-memory render surface for exercising the harvest loop
//! without a browser.
//!
//! Locators follow the shape produced by the default scheme templates but
//! against a short `feed` base, and field rules use `@name` suffixes that
//! the fake resolves against each card's scripted content.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use scroll_harvester::adapter::{AdapterError, Locator, RenderAdapter};
use scroll_harvester::harvest::parser::{CardParser, ParserRules};
use scroll_harvester::harvest::retry::RetryPolicy;
use scroll_harvester::harvest::runner::HarvestRequest;
use scroll_harvester::harvest::view::LocatorScheme;

/// One scripted feed item.
#[derive(Debug, Clone)]
pub struct FakeCard {
    /// Visible once at least this many scrolls have happened.
    pub appear_after: u64,
    pub listing_id: Option<String>,
    pub text: String,
    pub status: Option<String>,
    /// Label on a rendered call-to-action element, if one exists.
    pub cta: Option<String>,
    pub page: Option<(String, String)>,
    pub anchors: Vec<(String, String)>,
    pub images: Vec<String>,
}

impl FakeCard {
    pub fn new(listing_id: &str) -> Self {
        Self {
            appear_after: 1,
            listing_id: Some(listing_id.to_string()),
            text: format!("Page Name\nSponsored\nBody for {}\nLearn More", listing_id),
            status: Some("Active".to_string()),
            cta: None,
            page: None,
            anchors: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn appearing_after(mut self, scrolls: u64) -> Self {
        self.appear_after = scrolls;
        self
    }

    pub fn with_cta(mut self, label: &str) -> Self {
        self.cta = Some(label.to_string());
        self
    }

    /// A card with no listing id and no text, so no identity can be derived.
    pub fn blank() -> Self {
        Self {
            appear_after: 1,
            listing_id: None,
            text: String::new(),
            status: None,
            cta: None,
            page: None,
            anchors: Vec::new(),
            images: Vec::new(),
        }
    }
}

/// One scripted segment: an (ordinal, inner-variant) bucket with slots.
#[derive(Debug, Clone)]
pub struct FakeSegment {
    pub ordinal: u32,
    pub inner: u32,
    pub slots: HashMap<u32, FakeCard>,
}

impl FakeSegment {
    pub fn new(ordinal: u32, inner: u32) -> Self {
        Self {
            ordinal,
            inner,
            slots: HashMap::new(),
        }
    }

    pub fn with_card(mut self, index: u32, card: FakeCard) -> Self {
        self.slots.insert(index, card);
        self
    }
}

/// Node handle produced by the fake surface.
#[derive(Debug, Clone)]
pub struct FakeNode {
    pub text: String,
    pub attrs: HashMap<String, String>,
}

impl FakeNode {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attrs: HashMap::new(),
        }
    }

    fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }
}

pub struct FakeAdapter {
    segments: Vec<FakeSegment>,
    scrolls: AtomicU64,
    /// Scroll calls past this count fail with a fatal surface error.
    fail_scroll_after: Option<u64>,
    slot_pattern: Regex,
}

impl FakeAdapter {
    pub fn new(segments: Vec<FakeSegment>) -> Self {
        Self {
            segments,
            scrolls: AtomicU64::new(0),
            fail_scroll_after: None,
            slot_pattern: Regex::new(
                r"^feed/div\[(\d+)\]/div\[(\d+)\]/div\[1\]/div\[(\d+)\]/div$",
            )
            .unwrap(),
        }
    }

    pub fn failing_scroll_after(mut self, scrolls: u64) -> Self {
        self.fail_scroll_after = Some(scrolls);
        self
    }

    pub fn scroll_count(&self) -> u64 {
        self.scrolls.load(Ordering::SeqCst)
    }

    fn card_at(&self, ordinal: u32, inner: u32, child: u32) -> Option<&FakeCard> {
        if child == 0 {
            return None;
        }
        let card = self
            .segments
            .iter()
            .find(|s| s.ordinal == ordinal && s.inner == inner)?
            .slots
            .get(&(child - 1))?;

        if card.appear_after <= self.scroll_count() {
            Some(card)
        } else {
            None
        }
    }

    /// Resolve "feed/div[o]/div[i]/div[1]/div[n]/div" to the scripted card.
    fn resolve_slot(&self, locator: &str) -> Option<&FakeCard> {
        let caps = self.slot_pattern.captures(locator)?;
        let ordinal: u32 = caps[1].parse().ok()?;
        let inner: u32 = caps[2].parse().ok()?;
        let child: u32 = caps[3].parse().ok()?;
        self.card_at(ordinal, inner, child)
    }

    fn resolve_field(&self, card: &FakeCard, field: &str) -> Option<FakeNode> {
        if let Some(phrase) = field.strip_prefix("cta:") {
            return match &card.cta {
                Some(label) if label == phrase => Some(FakeNode::text(label.clone())),
                _ => None,
            };
        }

        match field {
            "libid" => card
                .listing_id
                .as_ref()
                .map(|id| FakeNode::text(format!("Library ID: {}", id))),
            "status" => card.status.clone().map(FakeNode::text),
            "started" => Some(FakeNode::text("Started running on Jan 1, 2026")),
            "page" => card
                .page
                .as_ref()
                .map(|(name, url)| FakeNode::text(name.clone()).with_attr("href", url)),
            _ => None,
        }
    }
}

#[async_trait]
impl RenderAdapter for FakeAdapter {
    type Node = FakeNode;

    async fn scroll(&self, _pixels: i64) -> Result<(), AdapterError> {
        let count = self.scrolls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.fail_scroll_after {
            if count > limit {
                return Err(AdapterError::SurfaceGone("window closed".to_string()));
            }
        }
        Ok(())
    }

    async fn query_one(&self, locator: &Locator) -> Result<Option<FakeNode>, AdapterError> {
        let raw = locator.as_str();

        if let Some((slot, field)) = raw.split_once('@') {
            let Some(card) = self.resolve_slot(slot) else {
                return Ok(None);
            };
            return Ok(self.resolve_field(card, field));
        }

        Ok(self
            .resolve_slot(raw)
            .map(|card| FakeNode::text(card.text.clone())))
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<FakeNode>, AdapterError> {
        let raw = locator.as_str();
        let Some((slot, field)) = raw.split_once('@') else {
            return Ok(Vec::new());
        };
        let Some(card) = self.resolve_slot(slot) else {
            return Ok(Vec::new());
        };

        let nodes = match field {
            "a" => card
                .anchors
                .iter()
                .map(|(href, label)| FakeNode::text(label.clone()).with_attr("href", href))
                .collect(),
            "img" => card
                .images
                .iter()
                .map(|src| FakeNode::text("").with_attr("src", src))
                .collect(),
            _ => Vec::new(),
        };
        Ok(nodes)
    }

    async fn text_of(&self, node: &FakeNode) -> Result<String, AdapterError> {
        Ok(node.text.clone())
    }

    async fn attribute_of(
        &self,
        node: &FakeNode,
        name: &str,
    ) -> Result<Option<String>, AdapterError> {
        Ok(node.attrs.get(name).cloned())
    }

    async fn click(&self, _node: &FakeNode) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Scheme matching the fake's locator grammar.
pub fn scheme() -> LocatorScheme {
    LocatorScheme {
        segment_base: "feed".to_string(),
        first_segment_ordinal: 2,
        segment_inner_variants: vec![4, 3],
        slot_probe_suffix: "/div".to_string(),
    }
}

/// Field rules matching the fake's `@name` suffixes.
pub fn rules() -> ParserRules {
    ParserRules {
        expand_button: String::new(),
        status: "@status".to_string(),
        listing_id: "@libid".to_string(),
        started: "@started".to_string(),
        page_link: "@page".to_string(),
        anchors: "@a".to_string(),
        images: "@img".to_string(),
        sponsor_marker: "Sponsored".to_string(),
        cta_probe: "{slot}@cta:{phrase}".to_string(),
        cta_phrases: vec!["Learn More".to_string(), "Shop Now".to_string()],
        internal_domains: vec!["facebook.com".to_string()],
        media_attrs: vec!["src".to_string()],
        chrome_labels: vec!["Sponsored".to_string()],
    }
}

pub fn parser() -> CardParser {
    CardParser::new(rules()).unwrap()
}

/// A request with timing collapsed so runs complete immediately.
pub fn request(limit: usize, gap_tolerance: u32) -> HarvestRequest {
    HarvestRequest {
        limit,
        max_dead_cycles: 2,
        gap_tolerance,
        scroll_pixels: 100,
        settle_ms: (0, 0),
        retry: RetryPolicy {
            max_attempts: 2,
            backoff: Duration::ZERO,
        },
        resume_from: None,
        checkpoint_path: None,
    }
}
