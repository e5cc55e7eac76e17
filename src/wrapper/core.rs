//! Page-side request/response endpoint.
//!
//! The [`ExtensionWrapper`] stamps every outbound message with its sender
//! identity and a fresh request number, hands it to the active transport,
//! and keeps the registry of preserved callbacks that inbound replies are
//! matched against.
//!
//! All operations are best effort: transport failures are logged and the
//! message is dropped, never reported to the caller.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::identifiers::{InternalId, RequestNumber, TabId};
use crate::page::{Document, PageContext, UrlInfo};
use crate::protocol::message::{GET_CLIPBOARD, INIT, SET_CLIPBOARD};
use crate::protocol::{Envelope, MessageExt};
use crate::transport::{Dispatcher, OneShot, PreservedCallback, RunType, Transport};

use super::factory::Capabilities;
use super::options::WrapperOptions;

// ============================================================================
// Reply
// ============================================================================

/// How a request wants its reply delivered.
pub enum Reply {
    /// Fire and forget.
    None,
    /// Deliver the first correlated reply, then forget the callback.
    Once(OneShot),
    /// Deliver every correlated reply until the callback is removed.
    Preserved(PreservedCallback),
}

impl Reply {
    /// Wraps a one-shot callback.
    pub fn once<F>(callback: F) -> Self
    where
        F: FnOnce(Value) + Send + 'static,
    {
        Self::Once(Box::new(callback))
    }

    /// Wraps a preserved callback.
    pub fn preserved<F>(callback: F) -> Self
    where
        F: FnMut(Value) + Send + 'static,
    {
        Self::Preserved(Box::new(callback))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "Reply::None",
            Self::Once(_) => "Reply::Once",
            Self::Preserved(_) => "Reply::Preserved",
        })
    }
}

// ============================================================================
// ExtensionWrapper
// ============================================================================

/// One logical endpoint of the page/extension channel.
///
/// Exactly one wrapper should exist per page context. It is built once
/// (usually by [`ExtensionWrapper::create`]), connected once, and
/// disconnected on teardown. Dropping it disconnects.
///
/// # Request Numbers
///
/// Numbers come from a 16-bit counter starting at 0, so the first request
/// is 1 and the counter wraps to 0 after 65535. One-shot and preserved
/// requests share the counter.
pub struct ExtensionWrapper {
    name: String,
    internal_id: InternalId,
    request_number: AtomicU16,
    clipboard: Arc<Mutex<String>>,
    dispatcher: Dispatcher,
    transport: Box<dyn Transport>,
    run_type: RunType,
    url_info: UrlInfo,
    page: PageContext,
    capabilities: Capabilities,
}

impl fmt::Debug for ExtensionWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionWrapper")
            .field("internal_id", &self.internal_id)
            .field("run_type", &self.run_type)
            .field("request_number", &self.request_number())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ExtensionWrapper - Construction
// ============================================================================

impl ExtensionWrapper {
    /// Creates a wrapper over an explicit transport.
    ///
    /// Capabilities are inferred from the transport's run type. Use
    /// [`ExtensionWrapper::create`] to select the transport from the
    /// environment instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `options` are invalid.
    pub fn new(
        transport: Box<dyn Transport>,
        page: PageContext,
        options: &WrapperOptions,
    ) -> Result<Self> {
        let capabilities = Capabilities::for_run_type(transport.run_type());
        Self::assemble(transport, page, options, capabilities)
    }

    pub(crate) fn assemble(
        transport: Box<dyn Transport>,
        page: PageContext,
        options: &WrapperOptions,
        capabilities: Capabilities,
    ) -> Result<Self> {
        options.validate()?;

        let internal_id = InternalId::generate(&options.extension_name);
        let run_type = transport.run_type();
        let url_info = transport.url_info().clone();

        debug!(%internal_id, %run_type, "Extension wrapper created");

        Ok(Self {
            name: options.extension_name.clone(),
            internal_id,
            request_number: AtomicU16::new(0),
            clipboard: Arc::new(Mutex::new(String::new())),
            dispatcher: Dispatcher::new(),
            transport,
            run_type,
            url_info,
            page,
            capabilities,
        })
    }
}

// ============================================================================
// ExtensionWrapper - Accessors
// ============================================================================

impl ExtensionWrapper {
    /// Returns the extension name tag.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns this endpoint's sender identity.
    #[inline]
    #[must_use]
    pub fn internal_id(&self) -> &InternalId {
        &self.internal_id
    }

    /// Returns the active transport's tag.
    #[inline]
    #[must_use]
    pub fn run_type(&self) -> RunType {
        self.run_type
    }

    /// Returns the frame URL decision table.
    #[inline]
    #[must_use]
    pub fn url_info(&self) -> &UrlInfo {
        &self.url_info
    }

    /// Returns the page this wrapper runs in.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// Returns the environment capability flags.
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns the tab identity, if the host has notified one.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> Option<TabId> {
        self.dispatcher.tab_id()
    }

    /// Returns the last allocated request number.
    #[inline]
    #[must_use]
    pub fn request_number(&self) -> RequestNumber {
        RequestNumber::new(self.request_number.load(Ordering::Relaxed))
    }

    /// Returns the number of preserved callbacks.
    #[inline]
    #[must_use]
    pub fn preserved_count(&self) -> usize {
        self.dispatcher.preserved_count()
    }

    /// Returns the clipboard text cached by the last [`get_clipboard`](Self::get_clipboard).
    #[must_use]
    pub fn clipboard_data(&self) -> String {
        self.clipboard.lock().clone()
    }

    /// Returns `true` if the page is the top frame.
    #[must_use]
    pub fn is_top_frame(&self) -> bool {
        self.transport.is_top_frame(&self.page)
    }

    /// Looks up a localized string. Empty where unsupported.
    #[must_use]
    pub fn get_message(&self, message_id: &str) -> String {
        self.transport.get_message(message_id)
    }

    /// Resolves the key-hook script resource. Empty where unsupported.
    #[must_use]
    pub fn get_key_hook_script_src(&self) -> String {
        self.transport.key_hook_script_src()
    }

    /// Generates an identity in this wrapper's name.
    #[must_use]
    pub fn get_unique_id(&self) -> InternalId {
        InternalId::generate(&self.name)
    }
}

// ============================================================================
// ExtensionWrapper - Messaging
// ============================================================================

impl ExtensionWrapper {
    /// Allocates the next request number.
    fn next_request_number(&self) -> RequestNumber {
        let previous = self.request_number.fetch_add(1, Ordering::Relaxed);
        RequestNumber::new(previous.wrapping_add(1))
    }

    /// Sends `data` to the host.
    ///
    /// A `type` key in `data` becomes the message type (default
    /// `unknown-command`). Returns the request number so the caller can
    /// later remove a preserved callback.
    ///
    /// Delivery is best effort: without a connected transport the message
    /// may be dropped or queued, depending on the host.
    pub fn post_message(&self, data: Value, reply: Reply) -> RequestNumber {
        let number = self.next_request_number();
        let envelope = Envelope::from_data(data, self.internal_id.clone(), number)
            .with_tab_id(self.dispatcher.tab_id());

        let (one_shot, preserved) = match reply {
            Reply::None => (None, false),
            Reply::Once(callback) => (Some(callback), false),
            Reply::Preserved(callback) => {
                self.dispatcher.preserve(number, callback);
                (None, true)
            }
        };

        trace!(%number, message_type = %envelope.message_type, preserved, "Posting message");

        let result = self.transport.send(&self.dispatcher, envelope, one_shot);
        if let Err(e) = result {
            warn!(%number, error = %e, "Failed to post message");
            if preserved {
                self.dispatcher.remove(number);
            }
        }

        number
    }

    /// Sends `data` and delivers the first reply to `callback`.
    pub fn post_message_with_reply<F>(&self, data: Value, callback: F) -> RequestNumber
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.post_message(data, Reply::once(callback))
    }

    /// Sends `data` and delivers every correlated reply to `callback` until
    /// [`remove_callback`](Self::remove_callback) or
    /// [`interrupt_callback`](Self::interrupt_callback).
    pub fn post_message_preserved<F>(&self, data: Value, callback: F) -> RequestNumber
    where
        F: FnMut(Value) + Send + 'static,
    {
        self.post_message(data, Reply::preserved(callback))
    }

    /// Opens the transport and sends the handshake.
    ///
    /// The handshake has type `message_type` (default `init`) and carries
    /// `{"url": <page location>}`. Call once per wrapper.
    pub fn connect(&self, message_type: Option<&str>, reply: Option<OneShot>) {
        self.transport.connect(&self.dispatcher);

        let number = self.next_request_number();
        let envelope = Envelope::new(
            message_type.unwrap_or(INIT),
            self.internal_id.clone(),
            number,
            json!({ "url": self.page.location() }),
        );

        if let Err(e) = self.transport.send(&self.dispatcher, envelope, reply) {
            warn!(%number, error = %e, "Failed to send handshake");
        }

        debug!(run_type = %self.run_type, %number, "Connected");
    }

    /// Releases the transport, the generic listener and all preserved
    /// callbacks. Safe to call without `connect` and more than once.
    pub fn disconnect(&self) {
        self.transport.disconnect();
        self.dispatcher.clear();
        trace!(run_type = %self.run_type, "Disconnected");
    }

    /// Installs the handler for messages no callback claims.
    ///
    /// Replaces any previous handler.
    pub fn set_message_listener<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.dispatcher.set_listener(Some(Arc::new(handler)));
    }

    /// Removes the generic message handler.
    pub fn clear_message_listener(&self) {
        self.dispatcher.set_listener(None);
    }

    /// Forgets a preserved callback. A reply already in flight is dropped
    /// when it arrives.
    pub fn remove_callback(&self, number: RequestNumber) {
        self.dispatcher.remove(number);
    }

    /// Invokes a preserved callback once with `data`, then removes it.
    pub fn interrupt_callback(&self, number: RequestNumber, data: Value) {
        if !self.dispatcher.interrupt(number, data) {
            trace!(%number, "No preserved callback to interrupt");
        }
    }
}

// ============================================================================
// ExtensionWrapper - Clipboard
// ============================================================================

impl ExtensionWrapper {
    /// Asks the host to write `data` to the system clipboard.
    pub fn set_clipboard(&self, data: impl Into<String>) {
        self.post_message(
            json!({ "type": SET_CLIPBOARD, "data": data.into() }),
            Reply::None,
        );
    }

    /// Reads the system clipboard through the host.
    ///
    /// Line endings are normalized to `\n`; the text is cached (see
    /// [`clipboard_data`](Self::clipboard_data)) and passed to `callback`
    /// together with `extra`.
    pub fn get_clipboard<F, A>(&self, callback: F, extra: A) -> RequestNumber
    where
        F: FnOnce(String, A) + Send + 'static,
        A: Send + 'static,
    {
        let cache = Arc::clone(&self.clipboard);

        self.post_message_with_reply(json!({ "type": GET_CLIPBOARD }), move |response| {
            let text = response.str_field("data").replace("\r\n", "\n");
            *cache.lock() = text.clone();
            callback(text, extra);
        })
    }
}

// ============================================================================
// ExtensionWrapper - Document
// ============================================================================

impl ExtensionWrapper {
    /// Runs `callback` once `document` is interactive.
    pub fn ensure_run<F>(&self, document: &Document, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        document.ensure_run(callback);
    }
}

impl Drop for ExtensionWrapper {
    fn drop(&mut self) {
        self.transport.disconnect();
        self.dispatcher.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
