//! Interceptor counters
//!
//! Counters use Relaxed ordering: they are observational only and do not
//! synchronize any other memory.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    active: AtomicU64,
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    events: AtomicU64,
}

impl Counters {
    pub(crate) fn record_begin(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.finish();
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.finish();
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        // saturating: a context may be finished without passing through begin
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    pub(crate) fn snapshot(&self) -> InterceptorMetrics {
        InterceptorMetrics {
            active_count: self.active.load(Ordering::Relaxed),
            total_begun: self.begun.load(Ordering::Relaxed),
            total_committed: self.committed.load(Ordering::Relaxed),
            total_rolled_back: self.rolled_back.load(Ordering::Relaxed),
            events_dispatched: self.events.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of interceptor statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorMetrics {
    /// Transactions begun and not yet finished
    pub active_count: u64,
    /// Total transactions begun
    pub total_begun: u64,
    /// Total transactions committed
    pub total_committed: u64,
    /// Total transactions rolled back
    pub total_rolled_back: u64,
    /// Total events delivered (one per event, not per listener)
    pub events_dispatched: u64,
}

impl InterceptorMetrics {
    /// Rolled back / finished
    pub fn rollback_rate(&self) -> f64 {
        let finished = self.total_committed + self.total_rolled_back;
        if finished > 0 {
            self.total_rolled_back as f64 / finished as f64
        } else {
            0.0
        }
    }
}
