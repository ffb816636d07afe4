//! Unsynchronized map core shared by the locked and event-loop backends.

use keel_core::{now_millis, Entry, Error, PutMode, Result};
use rustc_hash::FxHashMap;

/// The raw key-value map with no concurrency control.
///
/// Owners must guarantee exclusive access: [`crate::LockedStore`] wraps it
/// in a lock, [`crate::EventLoopStore`] confines it to one thread.
#[derive(Debug, Default)]
pub(crate) struct MemTable {
    data: FxHashMap<String, Entry>,
}

impl MemTable {
    pub(crate) fn new() -> Self {
        MemTable {
            data: FxHashMap::default(),
        }
    }

    /// Return the live entry for `key`, removing it first if its deadline
    /// has passed. Expired keys are never observable.
    pub(crate) fn read(&mut self, key: &str) -> Option<Entry> {
        let expired = self.data.get(key)?.is_expired_at(now_millis());
        if expired {
            self.data.remove(key);
            return None;
        }
        self.data.get(key).cloned()
    }

    /// Apply `mode` semantics. The existence checks consult the raw map:
    /// an expired-but-unobserved entry still counts as present until a
    /// read removes it.
    pub(crate) fn write(&mut self, key: &str, entry: Entry, mode: PutMode) -> Result<()> {
        match mode {
            PutMode::Overwrite => {}
            PutMode::IfAbsent => {
                if self.data.contains_key(key) {
                    return Err(Error::KeyExists);
                }
            }
            PutMode::Update => {
                if !self.data.contains_key(key) {
                    return Err(Error::KeyNotFound);
                }
            }
        }
        self.data.insert(key.to_string(), entry);
        Ok(())
    }

    /// Attach a TTL to an existing key. An already-expired key is removed
    /// and the operation fails.
    pub(crate) fn expire(&mut self, key: &str, deadline_ms: i64) -> bool {
        let expired = match self.data.get(key) {
            None => return false,
            Some(entry) => entry.is_expired_at(now_millis()),
        };
        if expired {
            self.data.remove(key);
            return false;
        }
        if let Some(entry) = self.data.get_mut(key) {
            entry.expires_at_ms = deadline_ms;
        }
        true
    }

    /// Visit live entries, skipping (but not removing) expired ones.
    /// Stops when the visitor returns false.
    pub(crate) fn iterate(&self, visit: &mut dyn FnMut(&str, &Entry) -> bool) {
        let now = now_millis();
        for (key, entry) in &self.data {
            if entry.is_expired_at(now) {
                continue;
            }
            if !visit(key, entry) {
                break;
            }
        }
    }
}
