//! Capability traits implemented by in-memory storage backends.
//!
//! The durability layer consumes backends exclusively through these
//! traits. [`Store`] is the minimal contract every backend provides;
//! [`IterableStore`] is the additional capability compaction needs to
//! stream live entries into a snapshot. Capability detection is a trait
//! bound, not a runtime downcast: code that cannot work without iteration
//! simply requires `IterableStore`.

use crate::error::Result;
use crate::types::{Entry, PutMode};

/// Minimal contract for an in-memory key-value backend.
///
/// Implementations own their concurrency control and apply lazy expiry
/// internally: an entry whose deadline has passed is removed on
/// observation and reads report absence.
pub trait Store: Send + Sync {
    /// Return the entry for `key` if present and not expired.
    fn read(&self, key: &str) -> Option<Entry>;

    /// Write `entry` under `key` with the given [`PutMode`] semantics.
    fn write(&self, key: &str, entry: Entry, mode: PutMode) -> Result<()>;

    /// Attach an absolute expiry deadline to an existing key.
    ///
    /// Returns false if the key is absent or already expired.
    fn expire(&self, key: &str, deadline_ms: i64) -> bool;

    /// Release backend resources. May be a no-op; must be idempotent.
    fn close(&self) -> Result<()>;
}

/// A backend that can stream its live entries.
///
/// Required by the compaction path: snapshots are produced by iterating
/// every live (non-expired) entry. Visit order is unspecified.
pub trait IterableStore: Store {
    /// Visit each live entry. The visitor returns false to stop early.
    ///
    /// Expired entries are skipped (not removed); snapshots must never
    /// persist dead keys.
    fn iterate(&self, visit: &mut dyn FnMut(&str, &Entry) -> bool);
}
