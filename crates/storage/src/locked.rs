//! Globally locked backend.

use keel_core::{Entry, IterableStore, PutMode, Result, Store};
use parking_lot::RwLock;

use crate::mem::MemTable;

/// A store protected by a single global readers-writer lock.
///
/// Every operation that can observe expiry takes the write lock, because
/// lazy expiration may delete keys even on a read. Iteration only skips
/// expired entries, so it can share the read lock with other iterators.
#[derive(Debug, Default)]
pub struct LockedStore {
    inner: RwLock<MemTable>,
}

impl LockedStore {
    /// Create an empty locked store.
    pub fn new() -> Self {
        LockedStore {
            inner: RwLock::new(MemTable::new()),
        }
    }
}

impl Store for LockedStore {
    fn read(&self, key: &str) -> Option<Entry> {
        self.inner.write().read(key)
    }

    fn write(&self, key: &str, entry: Entry, mode: PutMode) -> Result<()> {
        self.inner.write().write(key, entry, mode)
    }

    fn expire(&self, key: &str, deadline_ms: i64) -> bool {
        self.inner.write().expire(key, deadline_ms)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl IterableStore for LockedStore {
    fn iterate(&self, visit: &mut dyn FnMut(&str, &Entry) -> bool) {
        self.inner.read().iterate(visit)
    }
}
