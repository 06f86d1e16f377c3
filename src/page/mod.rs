//! Narrow page query interface.
//!
//! The engine never touches markup. Everything it needs from the displayed
//! page goes through [`Page`]: move the viewport, report scroll extent, look
//! for text, find controls matching a semantic query, and trigger a found
//! control. Providers:
//!
//! - [`CdpPage`]: a live Chrome tab driven over the DevTools protocol
//! - [`MemoryPage`]: an in-memory page for tests and dry runs

pub mod cdp;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cdp::CdpPage;
pub use memory::MemoryPage;

pub type PageResult<T> = std::result::Result<T, PageError>;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("DevTools protocol error: {0}")]
    Protocol(String),

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Control '{0}' belongs to a previous page")]
    StaleControl(String),

    #[error("Control '{0}' is no longer on the page")]
    ControlMissing(String),

    #[error("Failed to decode page response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Viewport position against total content height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_y: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl ScrollMetrics {
    /// Whether the viewport's bottom edge is within `threshold` of the end of content
    pub fn is_near_bottom(&self, threshold: f64) -> bool {
        self.viewport_height + self.scroll_y >= self.content_height - threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Reaction,
    Button,
}

/// What the engine is looking for, without saying how to find it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlQuery {
    /// Reaction controls whose label is one of `labels`
    Reaction { labels: Vec<String> },

    /// Buttons whose visible text contains `text`
    Button { text: String },
}

impl ControlQuery {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlQuery::Reaction { .. } => ControlKind::Reaction,
            ControlQuery::Button { .. } => ControlKind::Button,
        }
    }

    /// Whether a control with this label satisfies the query
    pub fn matches(&self, label: &str) -> bool {
        match self {
            ControlQuery::Reaction { labels } => labels.iter().any(|l| l == label),
            ControlQuery::Button { text } => label.contains(text.as_str()),
        }
    }
}

/// Transient handle to an actionable element on the current page.
///
/// Never persisted. `epoch` ties it to the page load it was found on; a
/// provider rejects it once the page has navigated away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRef {
    pub kind: ControlKind,
    /// Position among all controls of this kind, in document order
    pub index: usize,
    pub label: String,
    pub epoch: u64,
}

/// Title and body of the displayed topic's first post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub content_html: String,
}

/// The displayed page, as seen by the engine.
///
/// Missing page features degrade to `Ok(None)` / `Ok(false)` / empty results
/// rather than errors; errors mean the provider itself failed.
#[async_trait]
pub trait Page: Send + Sync {
    async fn current_url(&self) -> PageResult<String>;

    /// Replace the displayed page. Controls found before this call become stale.
    async fn navigate(&self, url: &str) -> PageResult<()>;

    /// The page reloaded itself after a triggered control. Controls found
    /// before this call become stale.
    async fn reloaded(&self) -> PageResult<()>;

    async fn scroll_by(&self, dy: f64) -> PageResult<()>;

    /// `None` when the page cannot report its height
    async fn scroll_metrics(&self) -> PageResult<Option<ScrollMetrics>>;

    async fn contains_text(&self, needle: &str) -> PageResult<bool>;

    /// Matching controls in document order
    async fn find_controls(&self, query: &ControlQuery) -> PageResult<Vec<ControlRef>>;

    async fn trigger(&self, control: &ControlRef) -> PageResult<()>;

    async fn article(&self) -> PageResult<Option<Article>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_bottom_threshold() {
        let metrics = ScrollMetrics {
            scroll_y: 700.0,
            viewport_height: 100.0,
            content_height: 1000.0,
        };
        assert!(metrics.is_near_bottom(200.0));
        assert!(!metrics.is_near_bottom(199.0));
    }

    #[test]
    fn test_reaction_query_matches_exact_label() {
        let query = ControlQuery::Reaction {
            labels: vec!["Like this post".to_string()],
        };
        assert!(query.matches("Like this post"));
        assert!(!query.matches("Like this post already"));
        assert_eq!(query.kind(), ControlKind::Reaction);
    }

    #[test]
    fn test_button_query_matches_contained_text() {
        let query = ControlQuery::Button {
            text: "重新加载".to_string(),
        };
        assert!(query.matches(" 重新加载 "));
        assert!(!query.matches("返回"));
    }
}
