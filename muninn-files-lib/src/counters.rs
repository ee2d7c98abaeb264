//! Shared per-resource access counters.
//!
//! One store, two synchronization strategies. The locked variant holds the
//! mutex across the whole read-modify-write and is linearizable. The naive
//! variant releases the lock between the read and the write, with a pause in
//! between that widens the race window until lost updates are routinely
//! observable under concurrent load.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use tokio::time::sleep;
use tracing::debug;

/// Default pause inserted between the naive variant's read and write.
pub const DEFAULT_RACE_DELAY: Duration = Duration::from_millis(1);

/// Synchronization strategy for [`CounterStore::increment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMode {
    /// Read-modify-write under one held lock.
    Locked,
    /// Read under the lock, release, pause, reacquire, write. Concurrent
    /// increments of the same key can overwrite each other.
    Naive,
}

/// Mapping from resource key to access count, shared by all workers.
///
/// Keys are normalized relative paths (`"."` for the root). Entries are
/// created on first access and never removed.
pub struct CounterStore {
    counts: Mutex<AHashMap<String, u64>>,
    mode: CounterMode,
    race_delay: Duration,
}

impl CounterStore {
    pub fn new(mode: CounterMode) -> Self {
        Self::with_race_delay(mode, DEFAULT_RACE_DELAY)
    }

    /// Override the naive variant's pause. Tests widen it to make lost
    /// updates near-certain; the locked variant ignores it.
    pub fn with_race_delay(mode: CounterMode, race_delay: Duration) -> Self {
        Self {
            counts: Mutex::new(AHashMap::new()),
            mode,
            race_delay,
        }
    }

    pub fn mode(&self) -> CounterMode {
        self.mode
    }

    /// Record one access of `key`, returning `(previous, next)`.
    ///
    /// Locked mode: for N concurrent callers of one key the returned pairs
    /// form the contiguous range 0..N. Naive mode: `next` is computed from a
    /// stale read, so a competitor's concurrent increment may be discarded.
    pub async fn increment(&self, key: &str) -> (u64, u64) {
        match self.mode {
            CounterMode::Locked => {
                let mut counts = self.lock_counts();
                let slot = counts.entry(key.to_string()).or_insert(0);
                let previous = *slot;
                *slot += 1;
                let next = *slot;
                debug!(key, previous, next, "counter incremented");
                (previous, next)
            }
            CounterMode::Naive => {
                let previous = {
                    let counts = self.lock_counts();
                    counts.get(key).copied().unwrap_or(0)
                };
                sleep(self.race_delay).await;
                let next = previous + 1;
                self.lock_counts().insert(key.to_string(), next);
                debug!(key, previous, next, "counter incremented (naive)");
                (previous, next)
            }
        }
    }

    /// Current count for `key`; 0 for keys never incremented. In naive mode
    /// the value may be mid-overwrite stale, which listing tolerates.
    pub fn get(&self, key: &str) -> u64 {
        self.lock_counts().get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys ever incremented.
    pub fn len(&self) -> usize {
        self.lock_counts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_counts().is_empty()
    }

    fn lock_counts(&self) -> MutexGuard<'_, AHashMap<String, u64>> {
        // A poisoned lock means a holder panicked; the map itself is still
        // consistent, so keep serving instead of spreading the panic.
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
