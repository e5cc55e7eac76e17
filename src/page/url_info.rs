//! Frame URL decision table.
//!
//! Decides which URL embeds the editor UI: the extension's own frame page,
//! or the externally hosted one matching the page's protocol.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;

use super::PageContext;

// ============================================================================
// Constants
// ============================================================================

/// Externally hosted frame, plain HTTP.
pub const EXTERNAL_FRAME_URL: &str = "http://wasavi.appsweets.net/";

/// Externally hosted frame, HTTPS.
pub const EXTERNAL_SECURE_FRAME_URL: &str = "https://ss1.xrea.com/wasavi.appsweets.net/";

/// Prefix of the data-URL placeholder treated as the internal frame.
pub const PLACEHOLDER_PREFIX: &str = "data:text/html;charset=UTF-8;base64,";

// ============================================================================
// FrameUrls
// ============================================================================

/// External frame locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameUrls {
    /// Frame served over HTTP.
    pub external: String,
    /// Frame served over HTTPS.
    pub external_secure: String,
}

impl Default for FrameUrls {
    fn default() -> Self {
        Self {
            external: EXTERNAL_FRAME_URL.to_string(),
            external_secure: EXTERNAL_SECURE_FRAME_URL.to_string(),
        }
    }
}

// ============================================================================
// UrlInfo
// ============================================================================

/// Embedding-URL decision state. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlInfo {
    options_url: String,
    internal_url: String,
    external_url: String,
    external_secure_url: String,
    can_use_internal: bool,
    can_use_extension_content: bool,
}

impl UrlInfo {
    /// Creates a decision table with the given internal URLs and capabilities.
    #[must_use]
    pub fn new(
        options_url: impl Into<String>,
        internal_url: impl Into<String>,
        can_use_internal: bool,
        can_use_extension_content: bool,
        frame_urls: &FrameUrls,
    ) -> Self {
        Self {
            options_url: options_url.into(),
            internal_url: internal_url.into(),
            external_url: frame_urls.external.clone(),
            external_secure_url: frame_urls.external_secure.clone(),
            can_use_internal,
            can_use_extension_content,
        }
    }

    /// Decision table for an environment without extension support.
    #[must_use]
    pub fn unsupported(frame_urls: &FrameUrls) -> Self {
        Self::new("", "", false, false, frame_urls)
    }

    /// Returns the options page URL.
    #[inline]
    #[must_use]
    pub fn options_url(&self) -> &str {
        &self.options_url
    }

    /// Returns the internal frame URL.
    #[inline]
    #[must_use]
    pub fn internal_url(&self) -> &str {
        &self.internal_url
    }

    /// Returns the external HTTP frame URL.
    #[inline]
    #[must_use]
    pub fn external_url(&self) -> &str {
        &self.external_url
    }

    /// Returns the external HTTPS frame URL.
    #[inline]
    #[must_use]
    pub fn external_secure_url(&self) -> &str {
        &self.external_secure_url
    }

    /// Returns `true` if the page is the internal frame or its placeholder.
    #[must_use]
    pub fn is_internal(&self, page: &PageContext) -> bool {
        same_page(page.location(), &self.internal_url)
            || page.location().starts_with(PLACEHOLDER_PREFIX)
    }

    /// Returns `true` if the page is one of the external frames.
    #[must_use]
    pub fn is_external(&self, page: &PageContext) -> bool {
        same_page(page.location(), &self.external_url)
            || same_page(page.location(), &self.external_secure_url)
    }

    /// Returns `true` if the page is any frame page.
    #[inline]
    #[must_use]
    pub fn is_any(&self, page: &PageContext) -> bool {
        self.is_internal(page) || self.is_external(page)
    }

    /// Returns the URL to embed the UI frame from.
    ///
    /// `None` means internal embedding exists but may not load extension
    /// content, so the caller must not embed at all.
    #[must_use]
    pub fn frame_source(&self, page: &PageContext) -> Option<&str> {
        if self.can_use_internal {
            return self
                .can_use_extension_content
                .then_some(self.internal_url.as_str());
        }

        if page.is_secure() {
            Some(&self.external_secure_url)
        } else {
            Some(&self.external_url)
        }
    }

    /// Builds the data-URL placeholder recognised by [`UrlInfo::is_internal`].
    #[must_use]
    pub fn placeholder_frame_source(html: &str) -> String {
        format!("{PLACEHOLDER_PREFIX}{}", Base64Standard.encode(html))
    }
}

/// Compares two URLs ignoring everything from the first `?`.
fn same_page(a: &str, b: &str) -> bool {
    strip_query(a) == strip_query(b)
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(head, _)| head)
}

// ============================================================================
// Tests
// ============================================================================
