//! Extension Bridge - Request/response messaging between an in-page script
//! and its browser extension host.
//!
//! A content script talks to the privileged side of its extension through
//! whatever messaging API the browser offers. This crate hides the
//! differences behind one endpoint, [`ExtensionWrapper`], that numbers every
//! request, correlates replies and keeps long-lived callbacks alive.
//!
//! # Architecture
//!
//! ```text
//! ExtensionWrapper ──► Transport ──► host API (trait object)
//!        ▲                 │
//!        └── Dispatcher ◄──┘  inbound messages
//! ```
//!
//! - **Wrapper**: envelopes, request numbers, preserved callbacks, clipboard
//! - **Transport**: one of three host flavours, or a no-op
//! - **Host API**: implemented by the embedding layer over the real browser
//!
//! # Quick Start
//!
//! ```
//! use extension_bridge::{EnvironmentMarkers, ExtensionWrapper, Hosts, PageContext, WrapperOptions};
//! use serde_json::json;
//!
//! # fn main() -> extension_bridge::Result<()> {
//! let markers = EnvironmentMarkers::default();
//! let wrapper = ExtensionWrapper::create(
//!     &markers,
//!     Hosts::new(),
//!     PageContext::new("https://example.com/"),
//!     &WrapperOptions::new(),
//! )?;
//!
//! wrapper.connect(None, None);
//! let number = wrapper.post_message_preserved(json!({"type": "watch"}), |reply| {
//!     println!("{reply}");
//! });
//! wrapper.remove_callback(number);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`wrapper`] | [`ExtensionWrapper`], options and transport selection |
//! | [`transport`] | Transport variants and host API traits |
//! | [`protocol`] | Envelope format and message tags |
//! | [`page`] | Page context, document readiness, frame URLs |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Type-safe identifiers for messaging entities.
pub mod identifiers;

/// Page context and frame URL decisions.
pub mod page;

/// Envelope format.
pub mod protocol;

/// Transport variants and host API traits.
///
/// - [`ChromeTransport`] - direct request/response
/// - [`OperaTransport`] - channel handoff
/// - [`JetpackTransport`] - polling sweep
pub mod transport;

/// Page-side endpoint.
///
/// Use [`ExtensionWrapper::create`] to build one for the current environment.
pub mod wrapper;

// ============================================================================
// Re-exports
// ============================================================================

// Wrapper types
pub use wrapper::{
    Capabilities, EnvironmentMarkers, ExtensionWrapper, Hosts, PresenceMarker, Reply,
    WrapperOptions, select_transport,
};

// Transport types
pub use transport::{
    ChromeRuntime, ChromeTransport, Dispatcher, JetpackOptions, JetpackPort, JetpackTransport,
    Listener, MessageChannel, MessagePort, NoneTransport, OneShot, OperaExtension,
    OperaTransport, PreservedCallback, RunType, Transport,
};

// Page types
pub use page::{Document, FrameElement, FrameUrls, PageContext, ReadyState, UrlInfo};

// Protocol types
pub use protocol::{Envelope, MessageExt};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{InternalId, ListenerId, RequestNumber, TabId};
