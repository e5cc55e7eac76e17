//! Outbound request envelope.
//!
//! Every message sent to the host travels inside an [`Envelope`] that
//! identifies the sender and carries the correlation number.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::identifiers::{InternalId, RequestNumber, TabId};

use super::message::UNKNOWN_COMMAND;

// ============================================================================
// Envelope
// ============================================================================

/// One outbound message.
///
/// # Format
///
/// ```json
/// {
///   "type": "get-clipboard",
///   "tabId": 3,
///   "internalId": "wasavi_1700000000000_4711",
///   "requestNumber": 12,
///   "data": { ... },
///   "callbackNumber": 12
/// }
/// ```
///
/// `tabId` is omitted until the host has notified one. `callbackNumber` is
/// only stamped by transports that correlate replies themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type tag.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Tab identity, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,

    /// Sender identity.
    pub internal_id: InternalId,

    /// Correlation number.
    pub request_number: RequestNumber,

    /// Opaque payload.
    pub data: Value,

    /// Number the host echoes back with a one-shot reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_number: Option<RequestNumber>,
}

impl Envelope {
    /// Creates an envelope with an explicit type.
    #[must_use]
    pub fn new(
        message_type: impl Into<String>,
        internal_id: InternalId,
        request_number: RequestNumber,
        data: Value,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            tab_id: None,
            internal_id,
            request_number,
            data,
            callback_number: None,
        }
    }

    /// Creates an envelope from caller data.
    ///
    /// A `type` key is lifted out of `data` and becomes the envelope type;
    /// without one the type is `unknown-command`. Non-object data becomes an
    /// empty payload.
    #[must_use]
    pub fn from_data(data: Value, internal_id: InternalId, request_number: RequestNumber) -> Self {
        let mut payload = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let message_type = payload
            .remove("type")
            .and_then(type_tag)
            .unwrap_or_else(|| UNKNOWN_COMMAND.to_string());

        Self::new(message_type, internal_id, request_number, Value::Object(payload))
    }

    /// Sets the tab identity.
    #[inline]
    #[must_use]
    pub fn with_tab_id(mut self, tab_id: Option<TabId>) -> Self {
        self.tab_id = tab_id;
        self
    }

    /// Converts to the JSON value handed to host APIs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Turns a caller-supplied `type` value into a tag. Falsy values yield `None`.
fn type_tag(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::String(_) | Value::Null | Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn sender() -> InternalId {
        InternalId::generate("test")
    }

    #[test]
    fn test_type_is_lifted_out_of_data() {
        let envelope = Envelope::from_data(
            json!({"type": "set-clipboard", "data": "abc"}),
            sender(),
            RequestNumber::new(3),
        );

        assert_eq!(envelope.message_type, "set-clipboard");
        assert_eq!(envelope.data, json!({"data": "abc"}));
        assert_eq!(envelope.request_number, RequestNumber::new(3));
    }

    #[test]
    fn test_missing_type_defaults_to_unknown_command() {
        let envelope = Envelope::from_data(json!({"x": 1}), sender(), RequestNumber::new(1));
        assert_eq!(envelope.message_type, "unknown-command");

        let envelope = Envelope::from_data(json!({"type": ""}), sender(), RequestNumber::new(1));
        assert_eq!(envelope.message_type, "unknown-command");
    }

    #[test]
    fn test_non_object_data_becomes_empty_payload() {
        let envelope = Envelope::from_data(Value::Null, sender(), RequestNumber::new(1));
        assert_eq!(envelope.data, json!({}));
    }

    #[test]
    fn test_wire_shape() {
        let id = sender();
        let envelope = Envelope::new("init", id.clone(), RequestNumber::new(9), json!({}))
            .with_tab_id(Some(TabId::new(json!(4))));
        let value = envelope.to_value().unwrap();

        assert_eq!(
            value,
            json!({
                "type": "init",
                "tabId": 4,
                "internalId": id.as_str(),
                "requestNumber": 9,
                "data": {}
            })
        );
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let value = Envelope::new("init", sender(), RequestNumber::new(1), json!({}))
            .to_value()
            .unwrap();

        assert!(value.get("tabId").is_none());
        assert!(value.get("callbackNumber").is_none());
    }
}
