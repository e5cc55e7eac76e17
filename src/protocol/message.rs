//! Inbound message accessors and reserved message types.
//!
//! Replies and notifications from the host are arbitrary JSON objects. The
//! bridge only looks at a few well-known fields; [`MessageExt`] reads them.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::identifiers::RequestNumber;

// ============================================================================
// Reserved Types
// ============================================================================

/// Handshake sent by `connect`.
pub const INIT: &str = "init";

/// Clipboard read request.
pub const GET_CLIPBOARD: &str = "get-clipboard";

/// Clipboard write request.
pub const SET_CLIPBOARD: &str = "set-clipboard";

/// Type used when the caller supplied none.
pub const UNKNOWN_COMMAND: &str = "unknown-command";

/// Channel-handoff side channel carrying the tab identity.
pub const NOTIFY_TAB_ID: &str = "opera-notify-tab-id";

// ============================================================================
// MessageExt
// ============================================================================

/// Field accessors for inbound JSON messages.
pub trait MessageExt {
    /// Returns the `requestNumber` field as a correlation number.
    fn request_number(&self) -> Option<RequestNumber>;

    /// Returns the `type` field.
    fn message_type(&self) -> Option<&str>;

    /// Returns a string field, or `""` if missing or not a string.
    fn str_field(&self, key: &str) -> &str;
}

impl MessageExt for Value {
    fn request_number(&self) -> Option<RequestNumber> {
        self.get("requestNumber").and_then(RequestNumber::from_value)
    }

    fn message_type(&self) -> Option<&str> {
        self.get("type").and_then(Value::as_str)
    }

    fn str_field(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_accessors() {
        let message = json!({"type": "get-clipboard", "requestNumber": 5, "data": "text"});

        assert_eq!(message.message_type(), Some(GET_CLIPBOARD));
        assert_eq!(message.request_number(), Some(RequestNumber::new(5)));
        assert_eq!(message.str_field("data"), "text");
        assert_eq!(message.str_field("missing"), "");
    }

    #[test]
    fn test_accessors_on_non_object() {
        let message = json!("plain");
        assert_eq!(message.request_number(), None);
        assert_eq!(message.message_type(), None);
    }
}
