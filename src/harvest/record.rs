use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Lifecycle status of a harvested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Inactive,
    #[default]
    Unknown,
}

/// Classification of an outbound link target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkTarget {
    /// Points back at one of the platform's own canonical domains.
    Internal,
    External,
}

/// One outbound link extracted from an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundLink {
    pub url: String,
    pub label: String,
    pub target: LinkTarget,
}

/// Reference to the source page an item belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRef {
    pub name: String,
    pub url: Option<String>,
}

/// One fully parsed feed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    /// Deterministic identity key: the explicit listing id when present,
    /// otherwise a content hash. Stable across re-renders of the same item.
    pub identity: String,

    pub status: RecordStatus,

    /// Primary free-text body.
    pub body: String,

    /// Source page reference, if one was rendered.
    pub page: Option<PageRef>,

    /// Call-to-action label, if one was detected.
    pub cta: Option<String>,

    /// Outbound links in document order, UI chrome removed.
    pub links: Vec<OutboundLink>,

    /// Media URLs in document order.
    pub media: Vec<String>,

    /// Raw timestamp string as rendered by the source.
    pub started_raw: Option<String>,

    /// Full raw text of the slot, kept for diagnostics.
    pub raw_text: String,
}

/// Derive a stable identity from a slot's text content.
///
/// Whitespace runs are collapsed before hashing so that cosmetic re-renders
/// (wrapping, indentation) never mint a new identity. Returns `None` for
/// text with no content to hash, forcing the parser to fail closed.
pub fn content_identity(raw_text: &str) -> Option<String> {
    let normalized = raw_text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }

    let digest = Sha256::digest(normalized.as_bytes());
    let mut key = String::with_capacity(7 + digest.len() * 2);
    key.push_str("sha256:");
    for byte in digest {
        let _ = write!(key, "{:02x}", byte);
    }
    Some(key)
}
