//! Message types exchanged with the extension host.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Envelope`] | Page → Host | Request carrying sender identity and correlation number |
//! | reply / notification | Host → Page | Arbitrary JSON, correlated by `requestNumber` |
//!
//! # Reserved Types
//!
//! | Type | Meaning |
//! |------|---------|
//! | `init` | Handshake sent on connect |
//! | `get-clipboard` / `set-clipboard` | Clipboard bridging |
//! | `unknown-command` | Default when the caller gives none |
//! | `opera-notify-tab-id` | Tab identity side channel (consumed by the transport) |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound request envelope.
pub mod envelope;

/// Inbound message accessors and reserved types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::Envelope;
pub use message::MessageExt;
