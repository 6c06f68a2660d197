//! Counter backend trait for abstracting the storage behind admission decisions.

use chrono::{DateTime, TimeDelta, Utc};

use super::counter::CounterEntry;
use super::key::RateLimitKey;
use crate::error::Result;

/// Trait for counter store implementations.
///
/// The admission policy, the administrative interface and the sweeper all
/// work against this trait, so a test can swap in a faulty store.
pub trait CounterBackend: Send + Sync {
    /// Current entry for `key`, or `None` if absent or expired.
    fn get(&self, key: &RateLimitKey) -> Result<Option<CounterEntry>>;

    /// Atomically count one request for `key` and return the updated entry.
    fn increment(&self, key: &RateLimitKey) -> Result<CounterEntry>;

    /// Remove the entry for `key`.
    fn reset(&self, key: &RateLimitKey) -> Result<()>;

    /// Drop every expired entry and return how many were removed.
    fn sweep_expired(&self) -> usize;

    /// Number of entries currently held, expired or not.
    fn tracked_keys(&self) -> usize;

    /// Length of a counting window.
    fn window(&self) -> TimeDelta;

    /// The time windows are measured against.
    fn now(&self) -> DateTime<Utc>;
}
