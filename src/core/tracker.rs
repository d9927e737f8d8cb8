use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Tracks the set of launched, not-yet-finished write attempts.
///
/// Intent
/// The scheduler must not declare a run finished while any attempt is still
/// executing. Each launched attempt registers itself via [`track`] and is
/// unregistered exactly once when its [`OutstandingGuard`] drops, on every
/// exit path including panics. [`await_empty`] blocks until the outstanding
/// count reaches zero.
///
/// Only the aggregate count matters; there is no ordering guarantee among
/// attempts.
///
/// [`track`]: CompletionTracker::track
/// [`await_empty`]: CompletionTracker::await_empty
#[derive(Debug, Clone, Default)]
pub struct CompletionTracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    drained: Notify,
}

/// Registration of one outstanding attempt. Dropping it unregisters.
#[derive(Debug)]
pub struct OutstandingGuard {
    inner: Arc<Inner>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unit of outstanding work.
    pub fn track(&self) -> OutstandingGuard {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        OutstandingGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Blocks until the outstanding count reaches zero.
    ///
    /// Returns immediately when nothing is tracked.
    pub async fn await_empty(&self) {
        loop {
            // Enable the waiter before checking the count so a concurrent
            // final untrack cannot slip between check and wait.
            let mut drained = pin!(self.inner.drained.notified());
            drained.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }

            drained.await;
        }
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
