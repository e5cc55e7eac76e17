//! Channel-handoff transport.
//!
//! For hosts that only offer a broadcast `postMessage` plus transferable
//! message ports (`opera.extension`). The first request that expects a
//! reply creates a [`MessageChannel`] and hands the far end to the host; the
//! near end's first message is the reply. The first such near end is then
//! retained and carries all later traffic in both directions.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;
use crate::identifiers::TabId;
use crate::page::UrlInfo;
use crate::protocol::message::NOTIFY_TAB_ID;
use crate::protocol::{Envelope, MessageExt};
use crate::wrapper::WrapperOptions;

use super::{Dispatcher, Listener, MessageChannel, MessagePort, OneShot, RunType, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Widget preference holding the extension id.
const WIDGET_ID_PREFERENCE: &str = "widget-id";

/// Widget preference holding the key-hook script.
const KEY_HOOK_PREFERENCE: &str = "keyHookScript";

// ============================================================================
// OperaExtension
// ============================================================================

/// Host API of a channel-handoff extension runtime.
pub trait OperaExtension: Send + Sync {
    /// Broadcasts a message, optionally transferring a port to the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is unavailable.
    fn post_message(&self, message: Value, port: Option<MessagePort>) -> Result<()>;

    /// Installs or clears the broadcast `onmessage` handler.
    fn set_onmessage(&self, handler: Option<Listener>);

    /// Reads a widget preference.
    fn preference(&self, key: &str) -> Option<String>;
}

// ============================================================================
// OperaTransport
// ============================================================================

/// Near ends owned by the transport.
#[derive(Debug, Default)]
struct PortState {
    /// Near end retained after the first handshake.
    retained: Option<MessagePort>,
    /// Near ends whose handshake reply has not arrived yet.
    pending: Vec<MessagePort>,
}

/// Transport over an [`OperaExtension`].
pub struct OperaTransport {
    host: Arc<dyn OperaExtension>,
    ports: Arc<Mutex<PortState>>,
    url_info: UrlInfo,
}

impl fmt::Debug for OperaTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperaTransport")
            .field("ports", &*self.ports.lock())
            .field("url_info", &self.url_info)
            .finish_non_exhaustive()
    }
}

impl OperaTransport {
    /// Creates a transport over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn OperaExtension>, options: &WrapperOptions) -> Self {
        let widget_id = host.preference(WIDGET_ID_PREFERENCE).unwrap_or_default();
        let base = format!("widget://{widget_id}");
        let url_info = UrlInfo::new(
            format!("{base}/{}", options.options_page()),
            format!("{base}/{}", options.frame_page()),
            false,
            false,
            &options.frame_urls,
        );

        Self {
            host,
            ports: Arc::new(Mutex::new(PortState::default())),
            url_info,
        }
    }

    /// Returns `true` once a near end has been retained.
    #[inline]
    #[must_use]
    pub fn has_port(&self) -> bool {
        self.ports.lock().retained.is_some()
    }

    /// Returns the number of handshakes awaiting their reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ports.lock().pending.len()
    }

    /// Builds the handler for a fresh near end.
    ///
    /// The first message goes to `reply`. Afterwards the near end becomes the
    /// retained port if none exists yet, otherwise it is closed. A near end
    /// no longer pending belongs to a torn-down connection and is ignored.
    fn handshake_handler(
        &self,
        near: &MessagePort,
        dispatcher: &Dispatcher,
        reply: OneShot,
    ) -> Listener {
        let reply = Mutex::new(Some(reply));
        let weak = near.downgrade();
        let ports = Arc::clone(&self.ports);
        let dispatcher = dispatcher.clone();

        Arc::new(move |message: Value| {
            let Some(near) = weak.upgrade() else {
                return;
            };
            let retain = {
                let mut ports = ports.lock();
                let Some(index) = ports.pending.iter().position(|p| p.same_port(&near)) else {
                    trace!("Ignored handshake reply on released port");
                    return;
                };
                ports.pending.swap_remove(index);

                let vacant = ports.retained.is_none();
                if vacant {
                    ports.retained = Some(near.clone());
                }
                vacant
            };

            let reply = reply.lock().take();
            if let Some(reply) = reply {
                reply(message);
            }

            if retain {
                near.set_onmessage(Some(inbound_handler(dispatcher.clone())));
                debug!("Retained message port for inbound traffic");
            } else {
                near.close();
            }
        })
    }
}

/// Routes inbound traffic, consuming tab-id notifications first.
fn inbound_handler(dispatcher: Dispatcher) -> Listener {
    Arc::new(move |message: Value| {
        if message.message_type() == Some(NOTIFY_TAB_ID) {
            let tab_id = message.get("tabId").cloned().map(TabId::new);
            trace!(?tab_id, "Tab id notified");
            dispatcher.set_tab_id(tab_id);
            return;
        }
        dispatcher.dispatch(message);
    })
}

impl Transport for OperaTransport {
    fn run_type(&self) -> RunType {
        RunType::Opera
    }

    fn url_info(&self) -> &UrlInfo {
        &self.url_info
    }

    fn send(
        &self,
        dispatcher: &Dispatcher,
        envelope: Envelope,
        reply: Option<OneShot>,
    ) -> Result<()> {
        let message = envelope.to_value()?;

        if let Some(reply) = reply {
            let (near, far) = MessageChannel::new();
            near.set_onmessage(Some(self.handshake_handler(&near, dispatcher, reply)));
            self.ports.lock().pending.push(near.clone());

            let result = self.host.post_message(message, Some(far));
            if result.is_err() {
                self.ports.lock().pending.retain(|p| !p.same_port(&near));
                near.close();
            }
            return result;
        }

        let port = self.ports.lock().retained.clone();
        match port {
            Some(port) => port.post_message(message),
            None => self.host.post_message(message, None),
        }
    }

    fn connect(&self, dispatcher: &Dispatcher) {
        self.host
            .set_onmessage(Some(inbound_handler(dispatcher.clone())));
        debug!("Broadcast handler installed");
    }

    fn disconnect(&self) {
        self.host.set_onmessage(None);

        let PortState { retained, pending } = std::mem::take(&mut *self.ports.lock());
        if !pending.is_empty() {
            debug!(count = pending.len(), "Released pending handshakes");
        }
        for port in pending {
            port.close();
        }
        if let Some(port) = retained {
            port.close();
            debug!("Retained message port closed");
        }
    }

    fn key_hook_script_src(&self) -> String {
        self.host
            .preference(KEY_HOOK_PREFERENCE)
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
