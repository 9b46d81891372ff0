use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::adapter::{AdapterError, Locator, RenderAdapter};
use crate::harvest::record::{
    content_identity, LinkTarget, OutboundLink, PageRef, ParsedRecord, RecordStatus,
};
use crate::harvest::segment::Segment;
use crate::harvest::view::RenderView;

/// Per-item parse failure. Non-fatal to the cycle unless it wraps a fatal
/// adapter error.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The slot was present during the scan but vanished before parsing.
    #[error("slot no longer present")]
    SlotVanished,

    /// No explicit id and no hashable text content. Failing closed here is
    /// what keeps identity keys deterministic.
    #[error("no stable identity could be derived")]
    MissingIdentity,

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl ParseError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseError::Adapter(e) if e.is_fatal())
    }
}

/// Extraction rules for one feed's item markup: locator suffixes composed
/// below a slot locator, plus the text-level heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserRules {
    /// Optional expander to click before reading fields. Empty disables it.
    pub expand_button: String,

    pub status: String,
    pub listing_id: String,
    pub started: String,
    pub page_link: String,
    pub anchors: String,
    pub images: String,

    /// Marker preceding the primary body text.
    pub sponsor_marker: String,

    /// Locator template probing for a rendered call-to-action element.
    /// `{slot}` and `{phrase}` are substituted per probe. Empty disables
    /// the rendered probe, leaving only the raw-text fallback.
    pub cta_probe: String,

    /// Recognized call-to-action labels, checked in order.
    pub cta_phrases: Vec<String>,

    /// Canonical domains counted as the platform's own.
    pub internal_domains: Vec<String>,

    /// Attributes probed, in order, for a media URL.
    pub media_attrs: Vec<String>,

    /// Link labels that are UI chrome rather than real targets.
    pub chrome_labels: Vec<String>,
}

impl Default for ParserRules {
    fn default() -> Self {
        Self {
            expand_button: r#"//div[@role="button" and .="Open Drop-down"]"#.to_string(),
            status: r#"//span[contains(text(),"Active") or contains(text(),"Inactive")]"#
                .to_string(),
            listing_id: r#"//span[contains(text(),"Library ID")]"#.to_string(),
            started: r#"//span[contains(text(),"Started running")]"#.to_string(),
            page_link: r#"//a[starts-with(@href,"https://www.facebook.com/")]"#.to_string(),
            anchors: "//a".to_string(),
            images: "//img".to_string(),
            sponsor_marker: "Sponsored".to_string(),
            cta_probe: concat!(
                r#"{slot}//div[@role="button" and normalize-space(text())="{phrase}"]"#,
                r#" | {slot}//span[normalize-space(text())="{phrase}"]"#
            )
            .to_string(),
            cta_phrases: [
                "Learn More",
                "Learn more",
                "Shop Now",
                "Shop now",
                "Book Now",
                "Book now",
                "Donate",
                "Donate now",
                "Apply Now",
                "Apply now",
                "Get offer",
                "Get Offer",
                "Get quote",
                "Sign Up",
                "Sign up",
                "Contact us",
                "Send message",
                "Send Message",
                "Subscribe",
                "Read more",
                "Send WhatsApp message",
                "Send WhatsApp Message",
                "Watch video",
                "Watch Video",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            internal_domains: [
                "facebook.com",
                "fb.com",
                "facebookw.com",
                "fb.me",
                "fb.watch",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            media_attrs: ["src", "data-src", "xlink:href"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chrome_labels: vec!["Sponsored".to_string()],
        }
    }
}

/// Parses one slot's subtree into a [`ParsedRecord`].
///
/// Identity extraction is mandatory and fails closed; every other field is
/// best-effort and defaults to empty/unknown when its extraction fails.
#[derive(Debug, Clone)]
pub struct CardParser {
    rules: ParserRules,
    body_break_url: Regex,
    body_break_cta: Regex,
    cta_fallback: Option<Regex>,
}

impl CardParser {
    pub fn new(rules: ParserRules) -> Result<Self> {
        let body_break_url = Regex::new(r"(?i)^https?://|^[A-Z0-9._%+-]+\.[A-Z]{2,}$")
            .context("Failed to compile body URL break pattern")?;
        let body_break_cta = Regex::new(r"^\w.*\b(Shop|Learn|Contact|Apply|Sign)\b")
            .context("Failed to compile body CTA break pattern")?;

        let cta_fallback = if rules.cta_phrases.is_empty() {
            None
        } else {
            let alternation = rules
                .cta_phrases
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                Regex::new(&format!(r"\b({})\b", alternation))
                    .context("Failed to compile CTA phrase pattern")?,
            )
        };

        Ok(Self {
            rules,
            body_break_url,
            body_break_cta,
            cta_fallback,
        })
    }

    pub fn rules(&self) -> &ParserRules {
        &self.rules
    }

    /// Parse the slot at (`segment`, `index`) on the given view.
    pub async fn parse<A: RenderAdapter>(
        &self,
        view: &RenderView<'_, A>,
        segment: &Segment,
        index: u32,
    ) -> Result<ParsedRecord, ParseError> {
        let adapter = view.adapter();
        let slot = view.slot_locator(segment, index);

        let root = adapter
            .query_one(&slot)
            .await?
            .ok_or(ParseError::SlotVanished)?;

        // Expand collapsed content first so the text walk sees all of it.
        if !self.rules.expand_button.is_empty() {
            if let Ok(Some(button)) = adapter.query_one(&slot.join(&self.rules.expand_button)).await
            {
                let _ = adapter.click(&button).await;
            }
        }

        let raw_text = soften(adapter.text_of(&root).await)?;

        // Identity comes first and is the only mandatory field.
        let identity = match soften(self.text_at(adapter, &slot, &self.rules.listing_id).await)? {
            Some(label) => parse_listing_id(&label),
            None => None,
        }
        .or_else(|| content_identity(&raw_text))
        .ok_or(ParseError::MissingIdentity)?;

        let status = soften(self.text_at(adapter, &slot, &self.rules.status).await)?
            .map(|s| parse_status(&s))
            .unwrap_or_default();

        let started_raw = soften(self.text_at(adapter, &slot, &self.rules.started).await)?;

        let page = soften(self.extract_page(adapter, &slot).await)?;
        let cta = self.extract_cta(adapter, &slot, &raw_text).await?;
        let links = soften(self.extract_links(adapter, &slot).await)?;
        let media = soften(self.extract_media(adapter, &slot).await)?;

        Ok(ParsedRecord {
            identity,
            status,
            body: self.extract_body(&raw_text),
            page,
            cta,
            links,
            media,
            started_raw,
            raw_text,
        })
    }

    /// Primary body: text after the sponsor marker, stopped at the first
    /// URL-looking line or short CTA-looking line.
    pub fn extract_body(&self, raw_text: &str) -> String {
        let Some((_, after)) = raw_text.split_once(&self.rules.sponsor_marker) else {
            return String::new();
        };

        let mut lines = Vec::new();
        for line in after.trim_start().lines() {
            if self.body_break_url.is_match(line) {
                break;
            }
            if line.len() < 40 && self.body_break_cta.is_match(line) {
                break;
            }
            lines.push(line.trim_end());
        }
        lines.join("\n").trim().to_string()
    }

    /// CTA phrase found anywhere in the raw text block.
    pub fn cta_in_text(&self, raw_text: &str) -> Option<String> {
        self.cta_fallback
            .as_ref()
            .and_then(|re| re.find(raw_text))
            .map(|m| m.as_str().to_string())
    }

    /// Classify one anchor, dropping UI chrome and unparseable targets.
    pub fn classify_link(&self, href: &str, label: &str) -> Option<OutboundLink> {
        let url = Url::parse(href).ok()?;
        let host = url.host_str()?.to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);

        let trimmed = label.trim();
        if self
            .rules
            .chrome_labels
            .iter()
            .any(|c| c.eq_ignore_ascii_case(trimmed))
        {
            return None;
        }

        let internal = self
            .rules
            .internal_domains
            .iter()
            .any(|d| host == d.as_str() || host.ends_with(&format!(".{}", d)));

        Some(OutboundLink {
            url: href.to_string(),
            label: trimmed.to_string(),
            target: if internal {
                LinkTarget::Internal
            } else {
                LinkTarget::External
            },
        })
    }

    async fn extract_cta<A: RenderAdapter>(
        &self,
        adapter: &A,
        slot: &Locator,
        raw_text: &str,
    ) -> Result<Option<String>, ParseError> {
        // Rendered element first: a button or span carrying exactly the phrase.
        if !self.rules.cta_probe.is_empty() {
            for phrase in &self.rules.cta_phrases {
                let probe = Locator::new(
                    self.rules
                        .cta_probe
                        .replace("{slot}", slot.as_str())
                        .replace("{phrase}", phrase),
                );
                match adapter.query_one(&probe).await {
                    Ok(Some(_)) => return Ok(Some(phrase.clone())),
                    Ok(None) => {}
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(_) => {}
                }
            }
        }

        // Fallback: first recognized phrase inside the raw block.
        Ok(self.cta_in_text(raw_text))
    }

    async fn extract_page<A: RenderAdapter>(
        &self,
        adapter: &A,
        slot: &Locator,
    ) -> Result<Option<PageRef>, AdapterError> {
        let Some(node) = adapter.query_one(&slot.join(&self.rules.page_link)).await? else {
            return Ok(None);
        };

        let name = adapter.text_of(&node).await?.trim().to_string();
        if name.is_empty() {
            return Ok(None);
        }
        let url = adapter.attribute_of(&node, "href").await?;

        Ok(Some(PageRef { name, url }))
    }

    async fn extract_links<A: RenderAdapter>(
        &self,
        adapter: &A,
        slot: &Locator,
    ) -> Result<Vec<OutboundLink>, AdapterError> {
        let mut links = Vec::new();

        for node in adapter.query_all(&slot.join(&self.rules.anchors)).await? {
            let href = match soften_inner(adapter.attribute_of(&node, "href").await)? {
                Some(h) if !h.is_empty() => h,
                _ => continue,
            };
            let label = soften_inner(adapter.text_of(&node).await)?;

            if let Some(link) = self.classify_link(&href, &label) {
                links.push(link);
            }
        }

        Ok(links)
    }

    async fn extract_media<A: RenderAdapter>(
        &self,
        adapter: &A,
        slot: &Locator,
    ) -> Result<Vec<String>, AdapterError> {
        let mut media = Vec::new();

        for node in adapter.query_all(&slot.join(&self.rules.images)).await? {
            for attr in &self.rules.media_attrs {
                match soften_inner(adapter.attribute_of(&node, attr).await)? {
                    Some(src) if src.starts_with("http:") || src.starts_with("https:") => {
                        media.push(src);
                        break;
                    }
                    _ => {}
                }
            }
        }

        Ok(media)
    }

    async fn text_at<A: RenderAdapter>(
        &self,
        adapter: &A,
        slot: &Locator,
        suffix: &str,
    ) -> Result<Option<String>, AdapterError> {
        match adapter.query_one(&slot.join(suffix)).await? {
            Some(node) => {
                let text = adapter.text_of(&node).await?;
                let text = text.trim();
                Ok(if text.is_empty() {
                    None
                } else {
                    Some(text.to_string())
                })
            }
            None => Ok(None),
        }
    }
}

/// Non-fatal adapter errors collapse to the field's default; fatal ones
/// always bubble to the harvest loop.
fn soften<T: Default>(result: Result<T, AdapterError>) -> Result<T, ParseError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(_) => Ok(T::default()),
    }
}

fn soften_inner<T: Default>(result: Result<T, AdapterError>) -> Result<T, AdapterError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(_) => Ok(T::default()),
    }
}

fn parse_listing_id(label: &str) -> Option<String> {
    let id = label.split_once(':').map(|(_, rest)| rest)?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn parse_status(text: &str) -> RecordStatus {
    if text.contains("Inactive") {
        RecordStatus::Inactive
    } else if text.contains("Active") {
        RecordStatus::Active
    } else {
        RecordStatus::Unknown
    }
}
