//! Fixed-window counter store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::trace;

use super::backend::CounterBackend;
use super::clock::{Clock, SystemClock};
use super::key::RateLimitKey;
use crate::config::MAX_WINDOW_MS;
use crate::error::{GateError, Result};

/// Requests counted for one key within one window.
///
/// `window_end` is always `window_start + window`. Once `now > window_end`
/// the entry is treated as absent, whether or not it has been removed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterEntry {
    pub count: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl CounterEntry {
    /// A fresh entry holding the first request of a new window.
    fn start(now: DateTime<Utc>, window: TimeDelta) -> Result<Self> {
        let window_end = now
            .checked_add_signed(window)
            .ok_or_else(|| GateError::InternalStoreFault("window end out of range".to_string()))?;
        Ok(Self {
            count: 1,
            window_start: now,
            window_end,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.window_end
    }

    /// Requests left before `limit` is reached; never negative.
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.count)
    }
}

/// In-memory counter store keyed by [`RateLimitKey`].
///
/// Increments for a key are serialized by the map's shard lock, so concurrent
/// bursts never lose updates. Expired entries are dropped lazily on read and
/// by [`CounterBackend::sweep_expired`].
pub struct CounterStore {
    entries: DashMap<RateLimitKey, CounterEntry>,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl CounterStore {
    /// Create a store measuring windows against the system clock.
    pub fn new(window: Duration) -> Result<Self> {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    /// Create a store with an explicit clock.
    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let window = TimeDelta::from_std(window)
            .map_err(|e| GateError::Config(format!("counter window out of range: {}", e)))?;
        if window <= TimeDelta::zero() {
            return Err(GateError::Config("counter window must be positive".to_string()));
        }
        if window > TimeDelta::milliseconds(MAX_WINDOW_MS as i64) {
            return Err(GateError::Config(format!(
                "counter window must be at most {}ms",
                MAX_WINDOW_MS
            )));
        }

        Ok(Self {
            entries: DashMap::new(),
            window,
            clock,
        })
    }
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterStore")
            .field("entries", &self.entries.len())
            .field("window", &self.window)
            .field("clock", &self.clock)
            .finish()
    }
}

impl CounterBackend for CounterStore {
    fn get(&self, key: &RateLimitKey) -> Result<Option<CounterEntry>> {
        let now = self.clock.now();
        // Copy out so the shard read guard is released before any removal.
        let entry = match self.entries.get(key).map(|e| *e) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            trace!(key = %key, "Dropped expired counter on read");
            return Ok(None);
        }

        Ok(Some(entry))
    }

    fn increment(&self, key: &RateLimitKey) -> Result<CounterEntry> {
        let now = self.clock.now();

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    // Expired entries are replaced, never revived.
                    *entry = CounterEntry::start(now, self.window)?;
                    trace!(key = %key, "Started new counter window");
                } else {
                    entry.count = entry.count.checked_add(1).ok_or_else(|| {
                        GateError::InternalStoreFault(format!("counter overflow for {}", key))
                    })?;
                }
                Ok(*entry)
            }
            Entry::Vacant(vacant) => {
                let entry = CounterEntry::start(now, self.window)?;
                vacant.insert(entry);
                trace!(key = %key, "Created counter");
                Ok(entry)
            }
        }
    }

    fn reset(&self, key: &RateLimitKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    fn window(&self) -> TimeDelta {
        self.window
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    fn store_with_clock(window_ms: u64) -> (CounterStore, ManualClock) {
        let clock = ManualClock::default();
        let store =
            CounterStore::with_clock(Duration::from_millis(window_ms), Arc::new(clock.clone()))
                .unwrap();
        (store, clock)
    }

    #[test]
    fn test_rejects_zero_window() {
        assert!(matches!(
            CounterStore::new(Duration::ZERO),
            Err(GateError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_window_beyond_limit() {
        assert!(matches!(
            CounterStore::new(Duration::from_millis(100_000_000_000_000_000)),
            Err(GateError::Config(_))
        ));
        assert!(CounterStore::new(Duration::from_millis(MAX_WINDOW_MS)).is_ok());
    }

    #[test]
    fn test_first_increment_creates_window() {
        let (store, clock) = store_with_clock(1000);
        let key = RateLimitKey::device("abcdefgh");

        let entry = store.increment(&key).unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_start, clock.now());
        assert_eq!(entry.window_end - entry.window_start, TimeDelta::milliseconds(1000));
    }

    #[test]
    fn test_sequential_increments_count_exactly() {
        let (store, _clock) = store_with_clock(60_000);
        let key = RateLimitKey::device("abcdefgh");

        for n in 1..=25 {
            assert_eq!(store.increment(&key).unwrap().count, n);
        }
        assert_eq!(store.get(&key).unwrap().map(|e| e.count), Some(25));
    }

    #[test]
    fn test_concurrent_increments_lose_nothing() {
        let (store, _clock) = store_with_clock(60_000);
        let key = RateLimitKey::ip("10.0.0.1");

        std::thread::scope(|scope| {
            for _ in 0..100 {
                scope.spawn(|| {
                    store.increment(&key).unwrap();
                });
            }
        });

        assert_eq!(store.get(&key).unwrap().map(|e| e.count), Some(100));
    }

    #[test]
    fn test_get_expires_lazily() {
        let (store, clock) = store_with_clock(1000);
        let key = RateLimitKey::device("abcdefgh");
        store.increment(&key).unwrap();

        // Still active exactly at the window end
        clock.advance(TimeDelta::milliseconds(1000));
        assert!(store.get(&key).unwrap().is_some());

        clock.advance(TimeDelta::milliseconds(1));
        assert!(store.get(&key).unwrap().is_none());
        assert_eq!(store.tracked_keys(), 0);
    }

    #[test]
    fn test_increment_after_expiry_replaces_entry() {
        let (store, clock) = store_with_clock(1000);
        let key = RateLimitKey::device("abcdefgh");
        store.increment(&key).unwrap();
        store.increment(&key).unwrap();

        clock.advance(TimeDelta::milliseconds(1001));
        let entry = store.increment(&key).unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_start, clock.now());
    }

    #[test]
    fn test_reset_removes_entry() {
        let (store, _clock) = store_with_clock(1000);
        let key = RateLimitKey::device("abcdefgh");
        store.increment(&key).unwrap();

        store.reset(&key).unwrap();
        assert!(store.get(&key).unwrap().is_none());

        // Resetting an absent key is fine
        store.reset(&key).unwrap();
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (store, clock) = store_with_clock(1000);
        let old = RateLimitKey::device("old-device");
        let fresh = RateLimitKey::device("fresh-device");

        store.increment(&old).unwrap();
        clock.advance(TimeDelta::milliseconds(600));
        store.increment(&fresh).unwrap();
        clock.advance(TimeDelta::milliseconds(600));

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.tracked_keys(), 1);
        assert!(store.get(&fresh).unwrap().is_some());
    }

    #[test]
    fn test_remaining_never_negative() {
        let (store, _clock) = store_with_clock(1000);
        let key = RateLimitKey::device("abcdefgh");
        for _ in 0..5 {
            store.increment(&key).unwrap();
        }
        let entry = store.get(&key).unwrap().unwrap();
        assert_eq!(entry.remaining(3), 0);
        assert_eq!(entry.remaining(10), 5);
    }
}
