//! Error types for the extension bridge.
//!
//! Public wrapper operations never surface errors: a best-effort transport
//! degrades to a logged no-op. Errors flow between the transports and the
//! host API implementations, and out of configuration validation.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Host | [`Error::Host`], [`Error::ChannelClosed`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    ///
    /// Returned when [`WrapperOptions`](crate::WrapperOptions) fail validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Host messaging API rejected an operation.
    ///
    /// Returned by host trait implementations when the privileged side
    /// cannot be reached.
    #[error("Host error: {message}")]
    Host {
        /// Description of the host failure.
        message: String,
    },

    /// Message posted through a closed channel port.
    #[error("Channel closed")]
    ChannelClosed,

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a host error.
    #[inline]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the host side could not be reached.
    #[inline]
    #[must_use]
    pub fn is_delivery_error(&self) -> bool {
        matches!(self, Self::Host { .. } | Self::ChannelClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================
