//! Direct request/response transport.
//!
//! For hosts whose messaging API accepts a reply callback on every send
//! (`chrome.runtime.sendMessage(message, callback)`). One-shot replies go
//! straight to the host; inbound traffic arrives through a single request
//! listener.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::identifiers::ListenerId;
use crate::page::UrlInfo;
use crate::protocol::Envelope;
use crate::wrapper::WrapperOptions;

use super::{Dispatcher, Listener, OneShot, RunType, Transport};

// ============================================================================
// ChromeRuntime
// ============================================================================

/// Host API of a direct request/response extension runtime.
pub trait ChromeRuntime: Send + Sync {
    /// Returns the extension id (`chrome.runtime.id`).
    fn id(&self) -> String;

    /// Sends a message, optionally with a reply callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is unavailable.
    fn send_message(&self, message: Value, reply: Option<OneShot>) -> Result<()>;

    /// Adds an inbound request listener.
    fn add_request_listener(&self, listener: Listener) -> ListenerId;

    /// Removes a listener added by [`ChromeRuntime::add_request_listener`].
    fn remove_request_listener(&self, id: ListenerId);

    /// Looks up a localized message (`chrome.i18n.getMessage`).
    fn get_i18n_message(&self, message_id: &str) -> Option<String>;

    /// Resolves a packaged resource to an absolute URL.
    fn get_url(&self, path: &str) -> String;
}

// ============================================================================
// ChromeTransport
// ============================================================================

/// Transport over a [`ChromeRuntime`].
pub struct ChromeTransport {
    runtime: Arc<dyn ChromeRuntime>,
    listener: Mutex<Option<ListenerId>>,
    url_info: UrlInfo,
    key_hook_script_path: String,
}

impl fmt::Debug for ChromeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromeTransport")
            .field("listener", &*self.listener.lock())
            .field("url_info", &self.url_info)
            .finish_non_exhaustive()
    }
}

impl ChromeTransport {
    /// Creates a transport over `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ChromeRuntime>, options: &WrapperOptions) -> Self {
        let base = format!("chrome-extension://{}", runtime.id());
        let url_info = UrlInfo::new(
            format!("{base}/{}", options.options_page()),
            format!("{base}/{}", options.frame_page()),
            true,
            true,
            &options.frame_urls,
        );

        Self {
            runtime,
            listener: Mutex::new(None),
            url_info,
            key_hook_script_path: options.key_hook_script_path.clone(),
        }
    }

    /// Returns `true` while the inbound listener is installed.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.listener.lock().is_some()
    }
}

impl Transport for ChromeTransport {
    fn run_type(&self) -> RunType {
        RunType::Chrome
    }

    fn url_info(&self) -> &UrlInfo {
        &self.url_info
    }

    fn send(
        &self,
        _dispatcher: &Dispatcher,
        envelope: Envelope,
        reply: Option<OneShot>,
    ) -> Result<()> {
        self.runtime.send_message(envelope.to_value()?, reply)
    }

    fn connect(&self, dispatcher: &Dispatcher) {
        let dispatcher = dispatcher.clone();
        let id = self
            .runtime
            .add_request_listener(Arc::new(move |message: Value| dispatcher.dispatch(message)));
        debug!(listener = id.get(), "Request listener installed");

        let previous = self.listener.lock().replace(id);
        if let Some(previous) = previous {
            warn!(listener = previous.get(), "Replaced existing request listener");
            self.runtime.remove_request_listener(previous);
        }
    }

    fn disconnect(&self) {
        let listener = self.listener.lock().take();
        if let Some(id) = listener {
            self.runtime.remove_request_listener(id);
            debug!(listener = id.get(), "Request listener removed");
        }
    }

    fn get_message(&self, message_id: &str) -> String {
        self.runtime
            .get_i18n_message(message_id)
            .unwrap_or_default()
    }

    fn key_hook_script_src(&self) -> String {
        self.runtime.get_url(&self.key_hook_script_path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::{InternalId, RequestNumber};
    use crate::transport::mock::MockChrome;

    fn setup() -> (Arc<MockChrome>, ChromeTransport, Dispatcher) {
        let runtime = Arc::new(MockChrome::new("abcdef"));
        let transport = ChromeTransport::new(runtime.clone(), &WrapperOptions::new());
        (runtime, transport, Dispatcher::new())
    }

    fn envelope(number: u16) -> Envelope {
        Envelope::new(
            "unknown-command",
            InternalId::generate("t"),
            RequestNumber::new(number),
            json!({}),
        )
    }

    #[test]
    fn test_one_shot_is_attached_to_host_call() {
        let (runtime, transport, dispatcher) = setup();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        transport
            .send(
                &dispatcher,
                envelope(1),
                Some(Box::new(move |v: Value| *sink.lock() = Some(v))),
            )
            .unwrap();
        transport.send(&dispatcher, envelope(2), None).unwrap();

        assert_eq!(runtime.sent_count(), 2);
        assert!(runtime.reply(0, json!({"ok": true})));
        assert!(!runtime.reply(1, json!({})));
        assert_eq!(*seen.lock(), Some(json!({"ok": true})));
    }

    #[test]
    fn test_connect_and_disconnect_manage_listener() {
        let (runtime, transport, dispatcher) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.set_listener(Some(Arc::new(move |v: Value| sink.lock().push(v))));

        transport.connect(&dispatcher);
        assert!(transport.is_connected());
        runtime.deliver(json!({"type": "notice"}));

        transport.disconnect();
        runtime.deliver(json!({"type": "notice"}));

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(runtime.listener_count(), 0);
    }

    #[test]
    fn test_reconnect_does_not_double_register() {
        let (runtime, transport, dispatcher) = setup();
        transport.connect(&dispatcher);
        transport.connect(&dispatcher);
        assert_eq!(runtime.listener_count(), 1);
    }

    #[test]
    fn test_disconnect_without_connect() {
        let (runtime, transport, _) = setup();
        transport.disconnect();
        assert_eq!(runtime.listener_count(), 0);
    }

    #[test]
    fn test_resources() {
        let (_, transport, _) = setup();

        assert_eq!(
            transport.key_hook_script_src(),
            "chrome-extension://abcdef/scripts/key_hook.js"
        );
        assert_eq!(transport.get_message("hello"), "msg:hello");
        assert_eq!(transport.get_message("missing"), "");
        assert_eq!(
            transport.url_info().internal_url(),
            "chrome-extension://abcdef/wasavi_frame.html"
        );
        assert_eq!(
            transport.url_info().options_url(),
            "chrome-extension://abcdef/options.html"
        );
    }
}
