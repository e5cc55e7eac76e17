//! Page-side context: where the script runs and how the UI frame embeds.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PageContext`] | Current location and frame position |
//! | [`Document`] | Document readiness tracker |
//! | [`UrlInfo`] | Embedding-URL decision table |

// ============================================================================
// Submodules
// ============================================================================

/// Document readiness and deferred execution.
pub mod document;

/// Frame URL decision table.
pub mod url_info;

// ============================================================================
// Imports
// ============================================================================

use url::Url;

// ============================================================================
// Re-exports
// ============================================================================

pub use document::{Document, ReadyState};
pub use url_info::{FrameUrls, UrlInfo};

// ============================================================================
// FrameElement
// ============================================================================

/// What the page can see of the element embedding it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameElement {
    /// No embedding element: the page is a top-level document.
    #[default]
    Absent,
    /// Embedded in a same-origin frame element.
    Present,
    /// Embedding element exists but cannot be inspected (cross-origin).
    Inaccessible,
}

// ============================================================================
// PageContext
// ============================================================================

/// Location and frame position of the page hosting the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    location: String,
    top_level: bool,
    frame_element: FrameElement,
}

impl PageContext {
    /// Creates a context for a top-level page at `location`.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            top_level: true,
            frame_element: FrameElement::Absent,
        }
    }

    /// Sets whether the page is the top window (`window.self == window.top`).
    #[inline]
    #[must_use]
    pub fn with_top_level(mut self, top_level: bool) -> Self {
        self.top_level = top_level;
        self
    }

    /// Sets what is known about the embedding element.
    #[inline]
    #[must_use]
    pub fn with_frame_element(mut self, frame_element: FrameElement) -> Self {
        self.frame_element = frame_element;
        self
    }

    /// Returns the full location (`location.href`).
    #[inline]
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns `true` if the page is the top window.
    #[inline]
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    /// Returns the embedding element state.
    #[inline]
    #[must_use]
    pub fn frame_element(&self) -> FrameElement {
        self.frame_element
    }

    /// Returns `true` if the location uses the `https:` protocol.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        Url::parse(&self.location)
            .map(|url| url.scheme() == "https")
            .unwrap_or(false)
    }
}

// ============================================================================
// Tests
// ============================================================================
