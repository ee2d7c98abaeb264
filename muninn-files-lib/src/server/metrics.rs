#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

/// Connection counters attached to accept/close log events. Relaxed
/// ordering throughout; the numbers are diagnostic, not control flow.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    active: AtomicUsize,
    total: AtomicUsize,
    denied: AtomicUsize,
    errors: AtomicUsize,
}

/// Point-in-time copy of the counters for structured log fields.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub active: usize,
    pub total: usize,
    pub denied: usize,
    pub errors: usize,
}

impl ConnectionStats {
    pub fn connection_opened(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1))
            .ok();
    }

    /// A request denied by admission control.
    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    /// A request that failed with a server-side or transport error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active: self.active.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> usize {
        self.denied.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}
