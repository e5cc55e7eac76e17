//! In-process two-ended message channel.
//!
//! Two entangled [`MessagePort`]s, where a message posted on one end is
//! delivered to the other end's handler. Messages queue until the receiving
//! end is started (explicitly or by installing a handler). Closing an end
//! drops its queue; messages posted to a closed end are silently discarded.
//!
//! Unlike the DOM `MessageChannel`, delivery is synchronous on the posting
//! thread. An end runs one handler at a time: a message posted while the
//! receiving end is delivering waits until the running handler returns, so
//! a handler that replaces itself sees the next message go to its
//! replacement.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};

use super::Listener;

// ============================================================================
// Shared State
// ============================================================================

#[derive(Default)]
struct PortEnd {
    onmessage: Mutex<Option<Listener>>,
    queue: Mutex<VecDeque<Value>>,
    started: AtomicBool,
    closed: AtomicBool,
    delivering: AtomicBool,
}

#[derive(Default)]
struct ChannelShared {
    ends: [PortEnd; 2],
}

// ============================================================================
// MessageChannel
// ============================================================================

/// Factory for entangled port pairs.
pub struct MessageChannel;

impl MessageChannel {
    /// Creates a channel and returns its two ends.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MessagePort, MessagePort) {
        let shared = Arc::new(ChannelShared::default());
        (
            MessagePort {
                shared: Arc::clone(&shared),
                side: 0,
            },
            MessagePort { shared, side: 1 },
        )
    }
}

// ============================================================================
// MessagePort
// ============================================================================

/// One end of a [`MessageChannel`].
///
/// Any live handle to either end keeps the channel alive.
#[derive(Clone)]
pub struct MessagePort {
    shared: Arc<ChannelShared>,
    side: usize,
}

impl fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("side", &self.side)
            .field("started", &self.end().started.load(Ordering::Acquire))
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MessagePort {
    fn end(&self) -> &PortEnd {
        &self.shared.ends[self.side]
    }

    fn peer(&self) -> &PortEnd {
        &self.shared.ends[1 - self.side]
    }

    /// Posts a message to the other end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if this end has been closed.
    pub fn post_message(&self, message: Value) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }

        let peer = self.peer();
        if peer.closed.load(Ordering::Acquire) {
            trace!("Discarded message posted to closed port");
            return Ok(());
        }

        peer.queue.lock().push_back(message);
        Self::flush(peer);
        Ok(())
    }

    /// Installs the message handler and starts delivery.
    ///
    /// `None` removes the handler; queued messages then wait for the next one.
    pub fn set_onmessage(&self, handler: Option<Listener>) {
        if self.is_closed() {
            return;
        }

        let install = handler.is_some();
        *self.end().onmessage.lock() = handler;
        if install {
            self.start();
        }
    }

    /// Starts delivery of queued and future messages.
    pub fn start(&self) {
        self.end().started.store(true, Ordering::Release);
        Self::flush(self.end());
    }

    /// Closes this end, dropping its handler and queue.
    pub fn close(&self) {
        let end = self.end();
        end.closed.store(true, Ordering::Release);
        let handler = end.onmessage.lock().take();
        end.queue.lock().clear();
        drop(handler);
    }

    /// Returns `true` if this end has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.end().closed.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same end of the same
    /// channel.
    #[must_use]
    pub fn same_port(&self, other: &MessagePort) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.side == other.side
    }

    /// Returns a handle that does not keep the channel alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakMessagePort {
        WeakMessagePort {
            shared: Arc::downgrade(&self.shared),
            side: self.side,
        }
    }

    /// Delivers queued messages one at a time, without holding locks across
    /// the handler call.
    ///
    /// Only one caller delivers per end; a nested or concurrent flush leaves
    /// its message for the active one.
    fn flush(end: &PortEnd) {
        loop {
            if end.delivering.swap(true, Ordering::AcqRel) {
                return;
            }
            Self::drain(end);
            end.delivering.store(false, Ordering::Release);

            if !Self::deliverable(end) {
                return;
            }
        }
    }

    fn drain(end: &PortEnd) {
        while Self::is_receiving(end) {
            let Some(handler) = end.onmessage.lock().clone() else {
                return;
            };
            let Some(message) = end.queue.lock().pop_front() else {
                return;
            };
            handler(message);
        }
    }

    fn is_receiving(end: &PortEnd) -> bool {
        end.started.load(Ordering::Acquire) && !end.closed.load(Ordering::Acquire)
    }

    fn deliverable(end: &PortEnd) -> bool {
        Self::is_receiving(end)
            && end.onmessage.lock().is_some()
            && !end.queue.lock().is_empty()
    }
}

// ============================================================================
// WeakMessagePort
// ============================================================================

/// Non-owning handle to a [`MessagePort`].
#[derive(Clone)]
pub struct WeakMessagePort {
    shared: Weak<ChannelShared>,
    side: usize,
}

impl WeakMessagePort {
    /// Returns the port if the channel is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<MessagePort> {
        self.shared.upgrade().map(|shared| MessagePort {
            shared,
            side: self.side,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
