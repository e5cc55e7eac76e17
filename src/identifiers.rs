//! Type-safe identifiers for messaging entities.
//!
//! Newtype wrappers keep correlation numbers, sender identities and tab
//! identities from being mixed up.
//!
//! | Type | Wraps | Purpose |
//! |------|-------|---------|
//! | [`RequestNumber`] | `u16` | Request/response correlation |
//! | [`InternalId`] | `String` | Sender identity of one wrapper |
//! | [`TabId`] | JSON value | Host-assigned tab identity (opaque) |
//! | [`ListenerId`] | `u64` | Handle for a registered host listener |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// RequestNumber
// ============================================================================

/// Correlation number of one outbound request.
///
/// Allocation wraps modulo 65536: `(n + 1) & 0xffff`. A preserved callback
/// that outlives a full cycle can alias a newly issued request; callers that
/// keep callbacks that long must remove them explicitly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestNumber(u16);

impl RequestNumber {
    /// Creates a request number from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Returns the number allocated after this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Interprets a JSON value as a request number.
    ///
    /// Accepts integers in range and their decimal string form, since hosts
    /// echo the number back as whatever their structured-clone produced.
    /// Integral floats such as `7.0` count as integers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw = match value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral))?,
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(integral))?
            }
            _ => return None,
        };
        u16::try_from(raw).ok().map(Self)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn integral(value: f64) -> Option<u64> {
    let in_range = (0.0..=f64::from(u16::MAX)).contains(&value);
    (in_range && value.fract() == 0.0).then(|| value as u64)
}

impl fmt::Display for RequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for RequestNumber {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

// ============================================================================
// InternalId
// ============================================================================

/// Sender identity stamped on every envelope.
///
/// Format: `<name>_<unix millis>_<random 0..65536>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalId(String);

impl InternalId {
    /// Generates an identity unique within the process lifetime.
    #[must_use]
    pub fn generate(name: &str) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let random = uuid::Uuid::new_v4().as_u128() & 0xffff;

        Self(format!("{name}_{millis}_{random}"))
    }

    /// Returns the identity as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TabId
// ============================================================================

/// Tab identity as notified by the host. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Value);

impl TabId {
    /// Wraps a host-provided value.
    #[inline]
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Handle returned by a host when a listener is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Creates a listener handle.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

// ============================================================================
// Tests
// ============================================================================
