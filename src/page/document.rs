//! Document readiness tracking.
//!
//! [`Document::ensure_run`] runs work once the document is interactive,
//! either immediately or on the first transition out of `loading`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

// ============================================================================
// Types
// ============================================================================

/// Deferred work waiting for the document to settle.
type Deferred = Box<dyn FnOnce() + Send>;

// ============================================================================
// ReadyState
// ============================================================================

/// `document.readyState`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadyState {
    /// Still parsing.
    #[default]
    Loading,
    /// Parsed; subresources may still load.
    Interactive,
    /// Fully loaded.
    Complete,
}

impl ReadyState {
    /// Returns `true` for `interactive` and `complete`.
    #[inline]
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Interactive | Self::Complete)
    }
}

// ============================================================================
// Document
// ============================================================================

struct DocumentInner {
    state: Mutex<ReadyState>,
    deferred: Mutex<Vec<Deferred>>,
}

/// Shared handle to the hosting document's readiness.
///
/// The embedder feeds state changes through [`Document::set_ready_state`].
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("state", &self.ready_state())
            .field("deferred", &self.inner.deferred.lock().len())
            .finish()
    }
}

impl Document {
    /// Creates a document in the given state.
    #[must_use]
    pub fn new(state: ReadyState) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                state: Mutex::new(state),
                deferred: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.inner.state.lock()
    }

    /// Records a state change, running deferred work when it settles.
    pub fn set_ready_state(&self, state: ReadyState) {
        let ready = {
            let mut current = self.inner.state.lock();
            *current = state;
            if state.is_settled() {
                std::mem::take(&mut *self.inner.deferred.lock())
            } else {
                Vec::new()
            }
        };

        if !ready.is_empty() {
            trace!(count = ready.len(), "Running deferred document work");
        }
        for work in ready {
            work();
        }
    }

    /// Runs `callback` once the document is interactive.
    ///
    /// Runs synchronously if already settled, otherwise exactly once on the
    /// first settling transition.
    pub fn ensure_run<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let state = self.inner.state.lock();
            if !state.is_settled() {
                self.inner.deferred.lock().push(Box::new(callback));
                return;
            }
        }
        callback();
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(ReadyState::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_runs_immediately_when_settled() {
        let document = Document::new(ReadyState::Complete);
        let (count, callback) = counter();

        document.ensure_run(callback);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_until_interactive() {
        let document = Document::new(ReadyState::Loading);
        let (count, callback) = counter();

        document.ensure_run(callback);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        document.set_ready_state(ReadyState::Interactive);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_runs_only_once() {
        let document = Document::default();
        let (count, callback) = counter();

        document.ensure_run(callback);
        document.set_ready_state(ReadyState::Interactive);
        document.set_ready_state(ReadyState::Complete);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_work_may_schedule_more_work() {
        let document = Document::default();
        let (count, callback) = counter();
        let nested = document.clone();

        document.ensure_run(move || nested.ensure_run(callback));
        document.set_ready_state(ReadyState::Complete);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
