//! Transport layer.
//!
//! A [`Transport`] binds the wrapper's request/response protocol to one host
//! messaging API. Each variant supplies how to send, how to receive, how to
//! keep the channel open, and where its auxiliary resources live.
//!
//! # Variants
//!
//! | Variant | Host API | Reply correlation |
//! |---------|----------|-------------------|
//! | [`ChromeTransport`] | [`ChromeRuntime`] | Native per-call reply callback |
//! | [`OperaTransport`] | [`OperaExtension`] | First message on a handed-off [`MessagePort`] |
//! | [`JetpackTransport`] | [`JetpackPort`] | Echoed `callbackNumber`, swept periodically |
//! | [`NoneTransport`] | none | Messages dropped |
//!
//! # Inbound Routing
//!
//! ```text
//! host message ──► transport listener ──► Dispatcher
//!                                          ├─ preserved callback (by requestNumber)
//!                                          ├─ variant-specific one-shot
//!                                          └─ generic message listener
//! ```
//!
//! # Delivery
//!
//! Transports keep their state behind interior locks and never hold one
//! across a host call. Hosts may therefore deliver replies synchronously
//! from inside `send_message` / `post_message`, and user callbacks are free
//! to call back into the wrapper.

// ============================================================================
// Submodules
// ============================================================================

/// In-process two-ended message channel.
pub mod channel;

/// Direct request/response transport.
pub mod chrome;

/// Inbound routing shared by all transports.
pub mod dispatch;

/// Polling-sweep transport.
pub mod jetpack;

#[cfg(test)]
pub(crate) mod mock;

/// Transport for environments without extension support.
pub mod none;

/// Channel-handoff transport.
pub mod opera;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::page::{PageContext, UrlInfo};
use crate::protocol::Envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{MessageChannel, MessagePort};
pub use chrome::{ChromeRuntime, ChromeTransport};
pub use dispatch::Dispatcher;
pub use jetpack::{JetpackOptions, JetpackPort, JetpackTransport};
pub use none::NoneTransport;
pub use opera::{OperaExtension, OperaTransport};

// ============================================================================
// Callback Types
// ============================================================================

/// Callback fired at most once with the reply to one request.
pub type OneShot = Box<dyn FnOnce(Value) + Send>;

/// Callback kept across any number of replies until removed.
pub type PreservedCallback = Box<dyn FnMut(Value) + Send>;

/// Handler for inbound messages.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

// ============================================================================
// RunType
// ============================================================================

/// Identifies the active transport variant, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunType {
    /// Direct request/response.
    #[serde(rename = "chrome-extension")]
    Chrome,
    /// Channel-handoff.
    #[serde(rename = "opera-extension")]
    Opera,
    /// Polling-sweep.
    #[serde(rename = "firefox-jetpack-extension")]
    FirefoxJetpack,
    /// No extension support.
    #[serde(rename = "none")]
    None,
}

impl RunType {
    /// Returns the tag string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chrome => "chrome-extension",
            Self::Opera => "opera-extension",
            Self::FirefoxJetpack => "firefox-jetpack-extension",
            Self::None => "none",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Capability set every transport variant provides.
///
/// Optional capabilities default to empty results, matching a host that
/// does not offer them.
pub trait Transport: Send + Sync {
    /// Returns the variant tag.
    fn run_type(&self) -> RunType;

    /// Returns the frame URL decision table for this host.
    fn url_info(&self) -> &UrlInfo;

    /// Sends an envelope. `reply`, when given, must fire at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be serialized or the host
    /// rejects it. The message is then lost.
    fn send(&self, dispatcher: &Dispatcher, envelope: Envelope, reply: Option<OneShot>)
    -> Result<()>;

    /// Opens the inbound path, routing through `dispatcher`.
    fn connect(&self, dispatcher: &Dispatcher);

    /// Releases listeners, timers and channels. Safe without `connect`.
    fn disconnect(&self);

    /// Looks up a localized string.
    fn get_message(&self, _message_id: &str) -> String {
        String::new()
    }

    /// Resolves the key-hook script resource.
    fn key_hook_script_src(&self) -> String {
        String::new()
    }

    /// Returns `true` if the page is the top frame.
    fn is_top_frame(&self, page: &PageContext) -> bool {
        page.is_top_level()
    }
}

// ============================================================================
// Tests
// ============================================================================
