//! Polling-sweep transport.
//!
//! For hosts with a single shared inbound event stream and no per-call
//! reply mechanism (Add-on SDK `self.port`). One-shot callbacks wait in a
//! local queue keyed by request number; the envelope carries the number as
//! `callbackNumber` and the host echoes it back with the reply.
//!
//! Every inbound reply and a periodic timer sweep the queue: the matching
//! entry fires, entries older than the timeout are dropped, everything else
//! carries over. The queue is swapped out and rebuilt on each sweep, so
//! registrations made by a firing callback are never lost.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::identifiers::RequestNumber;
use crate::page::{FrameElement, PageContext, UrlInfo};
use crate::protocol::Envelope;
use crate::wrapper::WrapperOptions;

use super::{Dispatcher, Listener, OneShot, RunType, Transport};

// ============================================================================
// JetpackPort
// ============================================================================

/// Options the add-on passes to its content script (`self.options`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JetpackOptions {
    /// Add-on id, e.g. `wasavi@appsweets.net`.
    pub extension_id: String,

    /// Key-hook script resource.
    #[serde(default)]
    pub key_hook_script: Option<String>,
}

/// Host API of a polling-sweep extension runtime.
///
/// Inbound events have the shape `{"payload": {...}, "callbackNumber": n}`,
/// with `callbackNumber` present only on one-shot replies.
pub trait JetpackPort: Send + Sync {
    /// Posts a message to the add-on.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is detached.
    fn post_message(&self, message: Value) -> Result<()>;

    /// Installs or clears the inbound `message` handler.
    fn on_message(&self, handler: Option<Listener>);

    /// Returns the content-script options.
    fn options(&self) -> JetpackOptions;
}

// ============================================================================
// CallbackQueue
// ============================================================================

/// A one-shot waiting for its echoed `callbackNumber`.
struct QueueItem {
    callback: OneShot,
    registered_at: Instant,
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("age", &self.registered_at.elapsed())
            .finish_non_exhaustive()
    }
}

/// Pending one-shot callbacks, swept by replies and by the timer.
#[derive(Clone)]
struct CallbackQueue {
    entries: Arc<Mutex<FxHashMap<RequestNumber, QueueItem>>>,
    timeout: Duration,
}

impl CallbackQueue {
    fn new(timeout: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(FxHashMap::default())),
            timeout,
        }
    }

    fn register(&self, number: RequestNumber, callback: OneShot) {
        self.entries.lock().insert(
            number,
            QueueItem {
                callback,
                registered_at: Instant::now(),
            },
        );
    }

    fn remove(&self, number: RequestNumber) {
        self.entries.lock().remove(&number);
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn clear(&self) {
        let entries = std::mem::take(&mut *self.entries.lock());
        if !entries.is_empty() {
            debug!(count = entries.len(), "Released pending callbacks");
        }
    }

    /// Fires the entry matching `matched` with `payload` and drops expired
    /// entries.
    fn sweep(&self, matched: Option<RequestNumber>, payload: Value) {
        let now = Instant::now();
        let current = std::mem::take(&mut *self.entries.lock());
        let mut next = FxHashMap::default();
        let mut fired = None;

        for (number, item) in current {
            if Some(number) == matched {
                fired = Some(item);
            } else if now.duration_since(item.registered_at) < self.timeout {
                next.insert(number, item);
            } else {
                trace!(%number, ?item, "Dropped expired callback");
            }
        }

        self.entries.lock().extend(next);

        match fired {
            Some(item) => (item.callback)(payload),
            None => {
                if let Some(number) = matched {
                    debug!(%number, "Reply for unknown callback");
                }
            }
        }
    }

    fn sweep_expired(&self) {
        self.sweep(None, Value::Null);
    }
}

// ============================================================================
// JetpackTransport
// ============================================================================

/// Transport over a [`JetpackPort`].
pub struct JetpackTransport {
    port: Arc<dyn JetpackPort>,
    queue: CallbackQueue,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    sweep_interval: Duration,
    url_info: UrlInfo,
    key_hook_script: String,
}

impl fmt::Debug for JetpackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JetpackTransport")
            .field("pending", &self.queue.len())
            .field("sweeping", &self.is_sweeping())
            .field("url_info", &self.url_info)
            .finish_non_exhaustive()
    }
}

impl JetpackTransport {
    /// Creates a transport over `port`.
    #[must_use]
    pub fn new(port: Arc<dyn JetpackPort>, options: &WrapperOptions) -> Self {
        let host_options = port.options();
        let base = format!(
            "resource://{}/{}/data",
            resource_hostname(&host_options.extension_id),
            options.extension_name
        );
        let url_info = UrlInfo::new(
            format!("{base}/{}", options.options_page()),
            format!("{base}/{}", options.frame_page()),
            true,
            false,
            &options.frame_urls,
        );

        Self {
            port,
            queue: CallbackQueue::new(options.callback_timeout),
            sweep_task: Mutex::new(None),
            sweep_interval: options.sweep_interval,
            url_info,
            key_hook_script: host_options.key_hook_script.unwrap_or_default(),
        }
    }

    /// Returns the number of one-shots awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` while the periodic sweep is running.
    #[inline]
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweep_task.lock().is_some()
    }

    fn start_sweep_timer(&self) {
        self.stop_sweep_timer();

        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime; periodic callback sweep disabled");
            return;
        };

        let queue = self.queue.clone();
        let period = self.sweep_interval;
        let task = handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                queue.sweep_expired();
            }
        });
        if let Some(previous) = self.sweep_task.lock().replace(task) {
            previous.abort();
        }

        debug!(interval_ms = period.as_millis() as u64, "Callback sweep started");
    }

    fn stop_sweep_timer(&self) {
        let task = self.sweep_task.lock().take();
        if let Some(task) = task {
            task.abort();
            debug!("Callback sweep stopped");
        }
    }
}

/// Maps an add-on id to its `resource://` hostname.
fn resource_hostname(extension_id: &str) -> String {
    extension_id
        .to_lowercase()
        .replace('@', "-at-")
        .replace('.', "-dot-")
}

impl Transport for JetpackTransport {
    fn run_type(&self) -> RunType {
        RunType::FirefoxJetpack
    }

    fn url_info(&self) -> &UrlInfo {
        &self.url_info
    }

    fn send(
        &self,
        _dispatcher: &Dispatcher,
        mut envelope: Envelope,
        reply: Option<OneShot>,
    ) -> Result<()> {
        let number = envelope.request_number;
        if let Some(reply) = reply {
            self.queue.register(number, reply);
            envelope.callback_number = Some(number);
        }

        let result = envelope
            .to_value()
            .and_then(|message| self.port.post_message(message));
        if result.is_err() && envelope.callback_number.is_some() {
            self.queue.remove(number);
        }
        result
    }

    fn connect(&self, dispatcher: &Dispatcher) {
        let dispatcher = dispatcher.clone();
        let queue = self.queue.clone();

        self.port.on_message(Some(Arc::new(move |event: Value| {
            let payload = event.get("payload").cloned().unwrap_or(Value::Null);
            let Some(payload) = dispatcher.route_preserved(payload) else {
                return;
            };

            match event.get("callbackNumber") {
                Some(number) => queue.sweep(RequestNumber::from_value(number), payload),
                None => dispatcher.emit(payload),
            }
        })));

        self.start_sweep_timer();
    }

    fn disconnect(&self) {
        self.port.on_message(None);
        self.stop_sweep_timer();
        self.queue.clear();
    }

    fn key_hook_script_src(&self) -> String {
        self.key_hook_script.clone()
    }

    fn is_top_frame(&self, page: &PageContext) -> bool {
        page.frame_element() == FrameElement::Absent
    }
}

impl Drop for JetpackTransport {
    fn drop(&mut self) {
        self.stop_sweep_timer();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::identifiers::InternalId;
    use crate::transport::mock::MockJetpack;

    fn setup() -> (Arc<MockJetpack>, JetpackTransport, Dispatcher) {
        let port = Arc::new(MockJetpack::new("Wasavi@Appsweets.net"));
        let transport = JetpackTransport::new(port.clone(), &WrapperOptions::new());
        (port, transport, Dispatcher::new())
    }

    fn envelope(number: u16) -> Envelope {
        Envelope::new(
            "get-clipboard",
            InternalId::generate("t"),
            RequestNumber::new(number),
            json!({}),
        )
    }

    fn slot() -> (Arc<Mutex<Vec<Value>>>, OneShot) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Box::new(move |v: Value| sink.lock().push(v)))
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_callback_number_is_stamped() {
        let (port, transport, dispatcher) = setup();
        let (_, reply) = slot();

        transport.send(&dispatcher, envelope(3), Some(reply)).unwrap();
        transport.send(&dispatcher, envelope(4), None).unwrap();

        let posted = port.posted();
        assert_eq!(posted[0]["callbackNumber"], json!(3));
        assert!(posted[1].get("callbackNumber").is_none());
        assert_eq!(transport.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_order() {
        let (port, transport, dispatcher) = setup();
        let (preserved, _) = slot();
        let (generic, _) = slot();
        let (reply_seen, reply) = slot();
        let p = Arc::clone(&preserved);
        let g = Arc::clone(&generic);
        dispatcher.preserve(RequestNumber::new(7), Box::new(move |v: Value| p.lock().push(v)));
        dispatcher.set_listener(Some(Arc::new(move |v: Value| g.lock().push(v))));
        transport.connect(&dispatcher);
        transport.send(&dispatcher, envelope(8), Some(reply)).unwrap();

        port.deliver(json!({"payload": {"requestNumber": 7}}));
        port.deliver(json!({"callbackNumber": 8, "payload": {"data": "x"}}));
        port.deliver(json!({"payload": {"type": "notice"}}));

        assert_eq!(*preserved.lock(), vec![json!({"requestNumber": 7})]);
        assert_eq!(*reply_seen.lock(), vec![json!({"data": "x"})]);
        assert_eq!(*generic.lock(), vec![json!({"type": "notice"})]);
        assert_eq!(transport.pending_count(), 0);
        transport.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_purges_expired_entries() {
        let (port, transport, dispatcher) = setup();
        let (seen, reply) = slot();
        transport.connect(&dispatcher);
        transport.send(&dispatcher, envelope(1), Some(reply)).unwrap();

        time::advance(Duration::from_secs(90)).await;
        settle().await;
        assert_eq!(transport.pending_count(), 1);

        time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(transport.pending_count(), 0);

        port.deliver(json!({"callbackNumber": 1, "payload": {}}));
        assert!(seen.lock().is_empty());
        transport.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_sweep_drops_expired_siblings() {
        let (port, transport, dispatcher) = setup();
        let (stale_seen, stale) = slot();
        let (fresh_seen, fresh) = slot();
        transport.connect(&dispatcher);

        transport.send(&dispatcher, envelope(1), Some(stale)).unwrap();
        time::advance(Duration::from_secs(60)).await;
        transport.send(&dispatcher, envelope(2), Some(fresh)).unwrap();
        port.deliver(json!({"callbackNumber": 2, "payload": "ok"}));

        assert_eq!(transport.pending_count(), 0);
        assert!(stale_seen.lock().is_empty());
        assert_eq!(*fresh_seen.lock(), vec![json!("ok")]);
        transport.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_timer_and_listener() {
        let (port, transport, dispatcher) = setup();
        transport.connect(&dispatcher);
        assert!(transport.is_sweeping());

        transport.disconnect();
        assert!(!transport.is_sweeping());
        assert!(!port.has_handler());

        let (_, reply) = slot();
        transport.send(&dispatcher, envelope(1), Some(reply)).unwrap();
        time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(transport.pending_count(), 1);
    }

    #[test]
    fn test_connect_without_runtime_skips_timer() {
        let (_, transport, dispatcher) = setup();
        transport.connect(&dispatcher);
        assert!(!transport.is_sweeping());
        transport.disconnect();
        transport.disconnect();
    }

    #[test]
    fn test_failed_post_releases_callback() {
        let (port, transport, dispatcher) = setup();
        port.detach();
        let (_, reply) = slot();

        assert!(transport.send(&dispatcher, envelope(1), Some(reply)).is_err());
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn test_resources() {
        let (_, transport, _) = setup();
        assert_eq!(
            transport.url_info().internal_url(),
            "resource://wasavi-at-appsweets-dot-net/wasavi/data/wasavi_frame.html"
        );
        assert_eq!(transport.key_hook_script_src(), "resource://hook.js");
    }

    #[test]
    fn test_is_top_frame_uses_frame_element() {
        let (_, transport, _) = setup();
        let page = PageContext::new("http://example.com/").with_top_level(false);

        assert!(transport.is_top_frame(&page));
        assert!(!transport.is_top_frame(&page.clone().with_frame_element(FrameElement::Present)));
        assert!(!transport.is_top_frame(&page.with_frame_element(FrameElement::Inaccessible)));
    }

    #[test]
    fn test_options_deserialize() {
        let options: JetpackOptions =
            serde_json::from_value(json!({"extensionId": "a@b", "keyHookScript": "k"})).unwrap();
        assert_eq!(options.extension_id, "a@b");
        assert_eq!(options.key_hook_script.as_deref(), Some("k"));
    }

    proptest! {
        #[test]
        fn prop_replies_route_to_their_own_callback(
            count in 1usize..12,
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..24),
        ) {
            let (port, transport, dispatcher) = setup();
            transport.connect(&dispatcher);

            let mut seen = Vec::with_capacity(count);
            for n in 0..count {
                let (replies, reply) = slot();
                let number = u16::try_from(n + 1).unwrap();
                transport.send(&dispatcher, envelope(number), Some(reply)).unwrap();
                seen.push(replies);
            }

            let mut answered = std::collections::BTreeSet::new();
            for pick in &picks {
                let n = pick.index(count);
                port.deliver(json!({"callbackNumber": n + 1, "payload": {"tag": n}}));
                answered.insert(n);
            }

            for (n, replies) in seen.iter().enumerate() {
                let expected = if answered.contains(&n) {
                    vec![json!({"tag": n})]
                } else {
                    Vec::new()
                };
                prop_assert_eq!(&*replies.lock(), &expected);
            }
            prop_assert_eq!(transport.pending_count(), count - answered.len());
            transport.disconnect();
        }
    }
}
