//! Wrapper configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use extension_bridge::WrapperOptions;
//!
//! let options = WrapperOptions::new()
//!     .with_extension_name("wasavi")
//!     .with_callback_timeout(Duration::from_secs(30));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::page::FrameUrls;

// ============================================================================
// Constants
// ============================================================================

/// Default extension name tag.
pub const DEFAULT_EXTENSION_NAME: &str = "wasavi";

/// Default period of the polling-sweep timer.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Default age after which an unanswered one-shot is dropped.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default key-hook script path inside the extension package.
pub const DEFAULT_KEY_HOOK_SCRIPT_PATH: &str = "scripts/key_hook.js";

// ============================================================================
// WrapperOptions
// ============================================================================

/// Tunables for an [`ExtensionWrapper`](crate::ExtensionWrapper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperOptions {
    /// Name tag used in unique ids and resource paths.
    pub extension_name: String,

    /// External frame locations.
    pub frame_urls: FrameUrls,

    /// Period of the polling-sweep timer.
    pub sweep_interval: Duration,

    /// Age after which an unanswered polling-sweep one-shot is dropped.
    pub callback_timeout: Duration,

    /// Key-hook script path resolved by the direct transport.
    pub key_hook_script_path: String,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            extension_name: DEFAULT_EXTENSION_NAME.to_string(),
            frame_urls: FrameUrls::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            key_hook_script_path: DEFAULT_KEY_HOOK_SCRIPT_PATH.to_string(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl WrapperOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the extension name tag.
    #[inline]
    #[must_use]
    pub fn with_extension_name(mut self, name: impl Into<String>) -> Self {
        self.extension_name = name.into();
        self
    }

    /// Sets the external frame locations.
    #[inline]
    #[must_use]
    pub fn with_frame_urls(mut self, frame_urls: FrameUrls) -> Self {
        self.frame_urls = frame_urls;
        self
    }

    /// Sets the polling-sweep period.
    #[inline]
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the polling-sweep callback timeout.
    #[inline]
    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Sets the key-hook script path.
    #[inline]
    #[must_use]
    pub fn with_key_hook_script_path(mut self, path: impl Into<String>) -> Self {
        self.key_hook_script_path = path.into();
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl WrapperOptions {
    /// File name of the internal frame page.
    #[must_use]
    pub fn frame_page(&self) -> String {
        format!("{}_frame.html", self.extension_name)
    }

    /// File name of the options page.
    #[inline]
    #[must_use]
    pub fn options_page(&self) -> &'static str {
        "options.html"
    }

    /// Checks that the options are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty name, a zero duration, or an
    /// external frame URL that does not parse.
    pub fn validate(&self) -> Result<()> {
        if self.extension_name.is_empty() {
            return Err(Error::config("extension name must not be empty"));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::config("sweep interval must be non-zero"));
        }
        if self.callback_timeout.is_zero() {
            return Err(Error::config("callback timeout must be non-zero"));
        }
        for url in [&self.frame_urls.external, &self.frame_urls.external_secure] {
            Url::parse(url)
                .map_err(|e| Error::config(format!("invalid frame URL {url}: {e}")))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
