//! Wrapper module: the page-side endpoint of the extension channel.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ExtensionWrapper`] | Request/response endpoint over one transport |
//! | [`Reply`] | How a request wants its reply delivered |
//! | [`WrapperOptions`] | Tunables |
//! | [`EnvironmentMarkers`] | Environment check results that select the transport |
//! | [`Hosts`] | Host API handles available to the factory |
//!
//! # Example
//!
//! ```
//! use extension_bridge::{EnvironmentMarkers, ExtensionWrapper, Hosts, PageContext, WrapperOptions};
//! use serde_json::json;
//!
//! # fn main() -> extension_bridge::Result<()> {
//! let wrapper = ExtensionWrapper::create(
//!     &EnvironmentMarkers::default(),
//!     Hosts::new(),
//!     PageContext::new("https://example.com/"),
//!     &WrapperOptions::new(),
//! )?;
//!
//! wrapper.connect(None, None);
//! wrapper.post_message_with_reply(json!({"type": "ping"}), |reply| {
//!     println!("{reply}");
//! });
//! wrapper.disconnect();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Request/response endpoint.
pub mod core;

/// Environment inspection and transport selection.
pub mod factory;

/// Wrapper configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::{ExtensionWrapper, Reply};
pub use factory::{Capabilities, EnvironmentMarkers, Hosts, PresenceMarker, select_transport};
pub use options::WrapperOptions;
