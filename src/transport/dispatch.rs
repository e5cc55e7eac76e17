//! Inbound routing shared by all transports.
//!
//! The [`Dispatcher`] owns the state every variant consults when a message
//! arrives: preserved callbacks keyed by request number, the single generic
//! listener, and the tab identity last notified by the host.
//!
//! No lock is held while a callback runs, so callbacks may register,
//! remove or interrupt callbacks, their own included.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::identifiers::{RequestNumber, TabId};
use crate::protocol::MessageExt;

use super::{Listener, PreservedCallback};

// ============================================================================
// Types
// ============================================================================

/// Registry entry for one preserved callback.
///
/// The callback is taken out of the slot while it runs. An interrupt that
/// arrives meanwhile parks its payload in `interrupted`; the running
/// invocation delivers it on return.
#[derive(Default)]
struct PreservedSlot {
    callback: Option<PreservedCallback>,
    interrupted: Option<Value>,
}

type SharedSlot = Arc<Mutex<PreservedSlot>>;

/// Map of request numbers to long-lived callbacks.
type PreservedMap = FxHashMap<RequestNumber, SharedSlot>;

// ============================================================================
// Dispatcher
// ============================================================================

/// Shared inbound routing state.
///
/// Cloning is cheap; clones share state.
#[derive(Clone, Default)]
pub struct Dispatcher {
    /// Preserved callbacks.
    preserved: Arc<Mutex<PreservedMap>>,
    /// Generic listener for uncorrelated messages.
    listener: Arc<Mutex<Option<Listener>>>,
    /// Tab identity notified by the host.
    tab_id: Arc<Mutex<Option<TabId>>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("preserved", &self.preserved_count())
            .field("has_listener", &self.listener.lock().is_some())
            .field("tab_id", &self.tab_id())
            .finish()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Preserved Callbacks
    // ========================================================================

    /// Registers a callback that survives any number of replies.
    pub fn preserve(&self, number: RequestNumber, callback: PreservedCallback) {
        let previous = self
            .preserved
            .lock()
            .insert(
                number,
                Arc::new(Mutex::new(PreservedSlot {
                    callback: Some(callback),
                    interrupted: None,
                })),
            );

        if previous.is_some() {
            debug!(%number, "Preserved callback replaced an older registration");
        }
    }

    /// Removes a preserved callback. Returns `true` if one was registered.
    pub fn remove(&self, number: RequestNumber) -> bool {
        self.preserved.lock().remove(&number).is_some()
    }

    /// Invokes a preserved callback once with `data`, then removes it.
    ///
    /// If the callback is running (it interrupted itself), `data` is
    /// delivered as soon as the running invocation returns.
    ///
    /// Returns `false` if no callback was registered.
    pub fn interrupt(&self, number: RequestNumber, data: Value) -> bool {
        let Some(entry) = self.preserved.lock().remove(&number) else {
            return false;
        };

        let mut callback = {
            let mut slot = entry.lock();
            match slot.callback.take() {
                Some(callback) => callback,
                None => {
                    trace!(%number, "Interrupt deferred until callback returns");
                    slot.interrupted = Some(data);
                    return true;
                }
            }
        };

        callback(data);
        true
    }

    /// Delivers `message` to the preserved callback matching its
    /// `requestNumber`.
    ///
    /// Returns the message back if no preserved callback claims it. A reply
    /// for a callback that is already running is dropped.
    pub fn route_preserved(&self, message: Value) -> Option<Value> {
        let Some(number) = message.request_number() else {
            return Some(message);
        };
        let Some(entry) = self.preserved.lock().get(&number).cloned() else {
            return Some(message);
        };

        let Some(mut callback) = entry.lock().callback.take() else {
            debug!(%number, "Dropped re-entrant reply for running callback");
            return None;
        };

        callback(message);
        self.finish(number, &entry, callback);
        None
    }

    /// Puts a callback back after it ran, unless it was removed or
    /// interrupted meanwhile.
    fn finish(&self, number: RequestNumber, entry: &SharedSlot, mut callback: PreservedCallback) {
        let data = {
            let preserved = self.preserved.lock();
            let mut slot = entry.lock();
            match slot.interrupted.take() {
                Some(data) => data,
                None => {
                    let registered = preserved
                        .get(&number)
                        .is_some_and(|current| Arc::ptr_eq(current, entry));
                    if registered {
                        slot.callback = Some(callback);
                    }
                    return;
                }
            }
        };

        callback(data);
    }

    /// Returns the number of preserved callbacks.
    #[inline]
    #[must_use]
    pub fn preserved_count(&self) -> usize {
        self.preserved.lock().len()
    }

    // ========================================================================
    // Generic Listener
    // ========================================================================

    /// Installs the generic listener, replacing any previous one.
    pub fn set_listener(&self, listener: Option<Listener>) {
        *self.listener.lock() = listener;
    }

    /// Returns `true` if a generic listener is installed.
    #[inline]
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Hands `message` to the generic listener, dropping it if none.
    pub fn emit(&self, message: Value) {
        let listener = self.listener.lock().clone();

        match listener {
            Some(listener) => listener(message),
            None => trace!("Dropped message without listener"),
        }
    }

    /// Routes `message`: preserved callback first, generic listener second.
    pub fn dispatch(&self, message: Value) {
        if let Some(message) = self.route_preserved(message) {
            self.emit(message);
        }
    }

    // ========================================================================
    // Tab Identity
    // ========================================================================

    /// Returns the tab identity, if the host has notified one.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> Option<TabId> {
        self.tab_id.lock().clone()
    }

    /// Records the tab identity.
    pub fn set_tab_id(&self, tab_id: Option<TabId>) {
        *self.tab_id.lock() = tab_id;
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Drops every preserved callback and the generic listener.
    pub fn clear(&self) {
        let preserved = std::mem::take(&mut *self.preserved.lock());
        let listener = self.listener.lock().take();

        if !preserved.is_empty() {
            debug!(count = preserved.len(), "Released preserved callbacks");
        }
        drop(preserved);
        drop(listener);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, PreservedCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Box::new(move |value: Value| sink.lock().push(value)))
    }

    #[test]
    fn test_preserved_fires_repeatedly() {
        let dispatcher = Dispatcher::new();
        let (seen, callback) = recorder();
        dispatcher.preserve(RequestNumber::new(4), callback);

        dispatcher.dispatch(json!({"requestNumber": 4, "n": 1}));
        dispatcher.dispatch(json!({"requestNumber": 4, "n": 2}));

        assert_eq!(seen.lock().len(), 2);
        assert_eq!(dispatcher.preserved_count(), 1);
    }

    #[test]
    fn test_removed_callback_not_invoked() {
        let dispatcher = Dispatcher::new();
        let (seen, callback) = recorder();
        let (generic, _) = recorder();
        let sink = Arc::clone(&generic);
        dispatcher.set_listener(Some(Arc::new(move |v: Value| sink.lock().push(v))));
        dispatcher.preserve(RequestNumber::new(4), callback);

        assert!(dispatcher.remove(RequestNumber::new(4)));
        assert!(!dispatcher.remove(RequestNumber::new(4)));
        dispatcher.dispatch(json!({"requestNumber": 4}));

        assert!(seen.lock().is_empty());
        assert_eq!(generic.lock().len(), 1);
    }

    #[test]
    fn test_interrupt_invokes_once_then_removes() {
        let dispatcher = Dispatcher::new();
        let (seen, callback) = recorder();
        dispatcher.preserve(RequestNumber::new(9), callback);

        assert!(dispatcher.interrupt(RequestNumber::new(9), json!("stop")));
        assert!(!dispatcher.interrupt(RequestNumber::new(9), json!("again")));
        dispatcher.dispatch(json!({"requestNumber": 9}));

        assert_eq!(*seen.lock(), vec![json!("stop")]);
        assert_eq!(dispatcher.preserved_count(), 0);
    }

    #[test]
    fn test_listener_is_single_slot() {
        let dispatcher = Dispatcher::new();
        let (first, _) = recorder();
        let (second, _) = recorder();
        let a = Arc::clone(&first);
        let b = Arc::clone(&second);

        dispatcher.set_listener(Some(Arc::new(move |v: Value| a.lock().push(v))));
        dispatcher.set_listener(Some(Arc::new(move |v: Value| b.lock().push(v))));
        dispatcher.dispatch(json!({"type": "notice"}));

        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);
    }

    #[test]
    fn test_callback_may_remove_itself() {
        let dispatcher = Dispatcher::new();
        let inner = dispatcher.clone();
        dispatcher.preserve(
            RequestNumber::new(1),
            Box::new(move |_: Value| {
                inner.remove(RequestNumber::new(1));
            }),
        );

        dispatcher.dispatch(json!({"requestNumber": 1}));
        assert_eq!(dispatcher.preserved_count(), 0);
    }

    #[test]
    fn test_callback_may_interrupt_itself() {
        let dispatcher = Dispatcher::new();
        let inner = dispatcher.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.preserve(
            RequestNumber::new(3),
            Box::new(move |reply: Value| {
                let last = reply.get("final").is_some();
                sink.lock().push(reply);
                if last {
                    assert!(inner.interrupt(RequestNumber::new(3), json!("done")));
                }
            }),
        );

        dispatcher.dispatch(json!({"requestNumber": 3}));
        dispatcher.dispatch(json!({"requestNumber": 3, "final": true}));
        dispatcher.dispatch(json!({"requestNumber": 3}));

        assert_eq!(
            *seen.lock(),
            vec![
                json!({"requestNumber": 3}),
                json!({"requestNumber": 3, "final": true}),
                json!("done"),
            ]
        );
        assert_eq!(dispatcher.preserved_count(), 0);
    }

    #[test]
    fn test_reentrant_reply_is_dropped() {
        let dispatcher = Dispatcher::new();
        let inner = dispatcher.clone();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        dispatcher.preserve(
            RequestNumber::new(2),
            Box::new(move |_: Value| {
                *c.lock() += 1;
                inner.dispatch(json!({"requestNumber": 2, "nested": true}));
            }),
        );

        dispatcher.dispatch(json!({"requestNumber": 2}));
        assert_eq!(*count.lock(), 1);
        assert_eq!(dispatcher.preserved_count(), 1);

        dispatcher.dispatch(json!({"requestNumber": 2}));
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_replacement_during_run_wins() {
        let dispatcher = Dispatcher::new();
        let inner = dispatcher.clone();
        let (seen, callback) = recorder();
        let replacement = Mutex::new(Some(callback));
        dispatcher.preserve(
            RequestNumber::new(6),
            Box::new(move |_: Value| {
                if let Some(callback) = replacement.lock().take() {
                    inner.preserve(RequestNumber::new(6), callback);
                }
            }),
        );

        dispatcher.dispatch(json!({"requestNumber": 6, "n": 1}));
        dispatcher.dispatch(json!({"requestNumber": 6, "n": 2}));

        assert_eq!(*seen.lock(), vec![json!({"requestNumber": 6, "n": 2})]);
    }

    #[test]
    fn test_clear() {
        let dispatcher = Dispatcher::new();
        let (_, callback) = recorder();
        dispatcher.preserve(RequestNumber::new(1), callback);
        dispatcher.set_listener(Some(Arc::new(|_: Value| {})));

        dispatcher.clear();
        assert_eq!(dispatcher.preserved_count(), 0);
        assert!(!dispatcher.has_listener());
    }
}
