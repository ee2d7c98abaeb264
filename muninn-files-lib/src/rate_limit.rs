//! Per-client admission control.
//!
//! A rolling-log sliding window: every identity keeps the timestamps of its
//! recent requests, stale entries are pruned on each decision, and a request
//! is admitted only while the in-window count stays strictly below the
//! configured rate. Exact over the trailing window, at a memory cost
//! proportional to burst size.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ahash::AHashMap;

/// Default trailing window for admission decisions.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Smallest accepted rate; lower configured values are clamped up.
pub const MIN_RATE: f64 = 0.1;

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Request is admitted.
    Allowed {
        /// Requests left in the current window after this one
        remaining: u64,
    },
    /// Request is denied.
    Limited {
        /// Time until the oldest in-window request ages out
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, Admission::Limited { .. })
    }

    pub fn remaining(&self) -> Option<u64> {
        match self {
            Admission::Allowed { remaining } => Some(*remaining),
            Admission::Limited { .. } => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Admission::Limited { retry_after } => Some(*retry_after),
            Admission::Allowed { .. } => None,
        }
    }
}

/// Sliding-window rate limiter keyed by client IP.
///
/// The check and the append are one exclusive section; splitting them would
/// let two workers admit on the same remaining slot. Identity records are
/// created lazily and retained for the process lifetime unless `evict_idle`
/// is called.
pub struct RateLimiter {
    table: Mutex<AHashMap<IpAddr, VecDeque<Instant>>>,
    max_rate: f64,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter admitting `max_rate` requests per identity per
    /// `window`. Rates below [`MIN_RATE`] (and NaN) are clamped to the floor.
    pub fn new(max_rate: f64, window: Duration) -> Self {
        Self {
            table: Mutex::new(AHashMap::new()),
            max_rate: max_rate.max(MIN_RATE),
            window,
        }
    }

    /// Admission check against the current time.
    pub fn admit(&self, identity: IpAddr) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// Admission check against a caller-supplied clock reading.
    ///
    /// Entries strictly older than the window age out; an entry exactly at
    /// the boundary is still counted.
    pub fn admit_at(&self, identity: IpAddr, now: Instant) -> Admission {
        let mut table = self.lock_table();
        let log = table.entry(identity).or_default();

        while log
            .front()
            .is_some_and(|&t| now.duration_since(t) > self.window)
        {
            log.pop_front();
        }

        if (log.len() as f64) < self.max_rate {
            log.push_back(now);
            Admission::Allowed {
                remaining: self.capacity().saturating_sub(log.len() as u64),
            }
        } else {
            let retry_after = log
                .front()
                .map(|&t| self.window.saturating_sub(now.duration_since(t)))
                .unwrap_or(self.window);
            Admission::Limited { retry_after }
        }
    }

    /// Requests admitted per window from an idle start.
    pub fn capacity(&self) -> u64 {
        self.max_rate.ceil() as u64
    }

    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.lock_table().len()
    }

    /// Drop identities whose whole log has aged out of the window at `now`,
    /// returning how many were removed. The server never calls this;
    /// retention is process-lifetime by default and this is the opt-in bound
    /// for long-running deployments with many distinct clients.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut table = self.lock_table();
        let before = table.len();
        table.retain(|_, log| {
            log.back()
                .is_some_and(|&t| now.duration_since(t) <= self.window)
        });
        before - table.len()
    }

    fn lock_table(&self) -> MutexGuard<'_, AHashMap<IpAddr, VecDeque<Instant>>> {
        // A poisoned lock means a holder panicked; the log data is still
        // consistent, so keep serving instead of spreading the panic.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
