pub mod proxy;
pub mod webdriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// Re-export common types
pub use proxy::{ProxyEndpoint, ProxyPool};
pub use webdriver::WebDriverAdapter;

/// Opaque locator string, meaningful only to the adapter that resolves it.
///
/// The harvesting core constructs locators from configured templates and
/// passes them through without ever interpreting their syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append an adapter-opaque suffix, yielding a locator scoped below this one.
    pub fn join(&self, suffix: &str) -> Locator {
        Locator(format!("{}{}", self.0, suffix))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors reported by a render adapter.
///
/// An absent node is not an error: `query_one` returns `Ok(None)` for it.
/// Errors are reserved for a surface that stopped cooperating.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The rendering surface (session, window) is gone. Fatal to the run.
    #[error("render surface unusable: {0}")]
    SurfaceGone(String),

    /// A node handle went stale between a query and its use. Per-item only.
    #[error("stale node handle")]
    StaleNode,

    /// Any other command failure. Fatal to the run.
    #[error("adapter command failed: {0}")]
    Command(String),
}

impl AdapterError {
    /// Whether the error terminates the run as a whole. Stale node handles
    /// only invalidate the item being parsed.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AdapterError::StaleNode)
    }
}

/// Capability contract for the rendering surface that owns the feed.
///
/// One instance per harvest run, owned exclusively by that run and passed
/// into the harvester constructor. All locators are resolved against the
/// surface's current rendered state; the adapter is the only component
/// permitted to trigger rendering (via `scroll`).
#[async_trait]
pub trait RenderAdapter: Send + Sync {
    /// Opaque handle to a rendered node.
    type Node: Send + Sync;

    /// Request more content by scrolling the surface by `pixels`.
    async fn scroll(&self, pixels: i64) -> Result<(), AdapterError>;

    /// Resolve a locator to at most one node. Absence is `Ok(None)`.
    async fn query_one(&self, locator: &Locator) -> Result<Option<Self::Node>, AdapterError>;

    /// Resolve a locator to every matching node, in document order.
    async fn query_all(&self, locator: &Locator) -> Result<Vec<Self::Node>, AdapterError>;

    /// Visible text content of a node.
    async fn text_of(&self, node: &Self::Node) -> Result<String, AdapterError>;

    /// Attribute value of a node, if set.
    async fn attribute_of(&self, node: &Self::Node, name: &str)
        -> Result<Option<String>, AdapterError>;

    /// Click a node. Used only for best-effort expansion before parsing.
    async fn click(&self, node: &Self::Node) -> Result<(), AdapterError>;
}
