//! In-memory host doubles for transport tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::ListenerId;

use super::{ChromeRuntime, JetpackOptions, JetpackPort, Listener, MessagePort, OneShot, OperaExtension};

// ============================================================================
// MockChrome
// ============================================================================

pub(crate) struct MockChrome {
    id: String,
    sent: Mutex<Vec<(Value, Option<OneShot>)>>,
    listeners: Mutex<FxHashMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
}

impl MockChrome {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            sent: Mutex::new(Vec::new()),
            listeners: Mutex::new(FxHashMap::default()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub(crate) fn sent_message(&self, index: usize) -> Value {
        self.sent.lock()[index].0.clone()
    }

    /// Fires the reply callback attached to the `index`-th send.
    pub(crate) fn reply(&self, index: usize, response: Value) -> bool {
        let reply = self.sent.lock().get_mut(index).and_then(|(_, r)| r.take());
        match reply {
            Some(reply) => {
                reply(response);
                true
            }
            None => false,
        }
    }

    pub(crate) fn deliver(&self, message: Value) {
        let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(message.clone());
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl ChromeRuntime for MockChrome {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn send_message(&self, message: Value, reply: Option<OneShot>) -> Result<()> {
        self.sent.lock().push((message, reply));
        Ok(())
    }

    fn add_request_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(id, listener);
        id
    }

    fn remove_request_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    fn get_i18n_message(&self, message_id: &str) -> Option<String> {
        (message_id != "missing").then(|| format!("msg:{message_id}"))
    }

    fn get_url(&self, path: &str) -> String {
        format!("chrome-extension://{}/{path}", self.id)
    }
}

// ============================================================================
// MockOpera
// ============================================================================

pub(crate) struct MockOpera {
    widget_id: String,
    posted: Mutex<Vec<(Value, Option<MessagePort>)>>,
    onmessage: Mutex<Option<Listener>>,
}

impl MockOpera {
    pub(crate) fn new(widget_id: &str) -> Self {
        Self {
            widget_id: widget_id.to_string(),
            posted: Mutex::new(Vec::new()),
            onmessage: Mutex::new(None),
        }
    }

    pub(crate) fn posted_count(&self) -> usize {
        self.posted.lock().len()
    }

    pub(crate) fn posted_message(&self, index: usize) -> Value {
        self.posted.lock()[index].0.clone()
    }

    /// Returns the `index`-th port transferred to the host.
    pub(crate) fn transferred_port(&self, index: usize) -> Option<MessagePort> {
        self.posted
            .lock()
            .iter()
            .filter_map(|(_, port)| port.clone())
            .nth(index)
    }

    pub(crate) fn broadcast(&self, message: Value) {
        let handler = self.onmessage.lock().clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub(crate) fn has_onmessage(&self) -> bool {
        self.onmessage.lock().is_some()
    }
}

impl OperaExtension for MockOpera {
    fn post_message(&self, message: Value, port: Option<MessagePort>) -> Result<()> {
        self.posted.lock().push((message, port));
        Ok(())
    }

    fn set_onmessage(&self, handler: Option<Listener>) {
        *self.onmessage.lock() = handler;
    }

    fn preference(&self, key: &str) -> Option<String> {
        match key {
            "widget-id" => Some(self.widget_id.clone()),
            "keyHookScript" => Some("hook-source".to_string()),
            _ => None,
        }
    }
}

// ============================================================================
// MockJetpack
// ============================================================================

pub(crate) struct MockJetpack {
    extension_id: String,
    posted: Mutex<Vec<Value>>,
    handler: Mutex<Option<Listener>>,
    detached: AtomicBool,
}

impl MockJetpack {
    pub(crate) fn new(extension_id: &str) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            posted: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            detached: AtomicBool::new(false),
        }
    }

    pub(crate) fn posted(&self) -> Vec<Value> {
        self.posted.lock().clone()
    }

    pub(crate) fn deliver(&self, event: Value) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Relaxed);
    }
}

impl JetpackPort for MockJetpack {
    fn post_message(&self, message: Value) -> Result<()> {
        if self.detached.load(Ordering::Relaxed) {
            return Err(Error::host("port detached"));
        }
        self.posted.lock().push(message);
        Ok(())
    }

    fn on_message(&self, handler: Option<Listener>) {
        *self.handler.lock() = handler;
    }

    fn options(&self) -> JetpackOptions {
        JetpackOptions {
            extension_id: self.extension_id.clone(),
            key_hook_script: Some("resource://hook.js".to_string()),
        }
    }
}
