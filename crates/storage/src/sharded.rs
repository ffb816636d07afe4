//! Sharded backend for reduced write contention.
//!
//! Replaces the global lock with a sharded concurrent map: DashMap locks
//! only the shard owning a key, and FxHash keeps lookups cheap. Reads on
//! different shards never contend.

use std::hash::BuildHasherDefault;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use keel_core::{now_millis, Entry, Error, IterableStore, PutMode, Result, Store};
use rustc_hash::FxHasher;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// A store partitioned across DashMap's internal shards.
///
/// Lazy expiry removes through `remove_if`, so a concurrent writer that
/// replaces the entry between observation and removal is never clobbered.
#[derive(Debug, Default)]
pub struct ShardedStore {
    map: DashMap<String, Entry, FxBuildHasher>,
}

impl ShardedStore {
    /// Create an empty sharded store.
    pub fn new() -> Self {
        ShardedStore {
            map: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Create a sharded store with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        ShardedStore {
            map: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
        }
    }

    /// Number of entries, including expired-but-unobserved ones.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Store for ShardedStore {
    fn read(&self, key: &str) -> Option<Entry> {
        // Clone out of the shard guard before any removal; holding a ref
        // while mutating the same shard would deadlock.
        let entry = self.map.get(key)?.value().clone();
        if entry.is_expired_at(now_millis()) {
            self.map.remove_if(key, |_, e| e.is_expired_at(now_millis()));
            return None;
        }
        Some(entry)
    }

    fn write(&self, key: &str, entry: Entry, mode: PutMode) -> Result<()> {
        match mode {
            PutMode::Overwrite => {
                self.map.insert(key.to_string(), entry);
                Ok(())
            }
            PutMode::IfAbsent => match self.map.entry(key.to_string()) {
                MapEntry::Occupied(_) => Err(Error::KeyExists),
                MapEntry::Vacant(slot) => {
                    slot.insert(entry);
                    Ok(())
                }
            },
            PutMode::Update => match self.map.entry(key.to_string()) {
                MapEntry::Occupied(mut slot) => {
                    slot.insert(entry);
                    Ok(())
                }
                MapEntry::Vacant(_) => Err(Error::KeyNotFound),
            },
        }
    }

    fn expire(&self, key: &str, deadline_ms: i64) -> bool {
        let now = now_millis();
        if self.map.remove_if(key, |_, e| e.is_expired_at(now)).is_some() {
            return false;
        }
        match self.map.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at_ms = deadline_ms;
                true
            }
            None => false,
        }
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl IterableStore for ShardedStore {
    fn iterate(&self, visit: &mut dyn FnMut(&str, &Entry) -> bool) {
        let now = now_millis();
        for item in self.map.iter() {
            if item.value().is_expired_at(now) {
                continue;
            }
            if !visit(item.key(), item.value()) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_round_trip() {
        let store = ShardedStore::new();
        store
            .write("k", Entry::new(b"v".to_vec()), PutMode::Overwrite)
            .unwrap();
        assert_eq!(store.read("k").unwrap().value, b"v");
    }

    #[test]
    fn test_mode_semantics() {
        let store = ShardedStore::new();
        store
            .write("k", Entry::new(b"v1".to_vec()), PutMode::Overwrite)
            .unwrap();
        assert!(matches!(
            store.write("k", Entry::new(b"v2".to_vec()), PutMode::IfAbsent),
            Err(Error::KeyExists)
        ));
        assert!(matches!(
            store.write("absent", Entry::new(b"v".to_vec()), PutMode::Update),
            Err(Error::KeyNotFound)
        ));
        store
            .write("k", Entry::new(b"v3".to_vec()), PutMode::Update)
            .unwrap();
        assert_eq!(store.read("k").unwrap().value, b"v3");
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let store = ShardedStore::new();
        store
            .write(
                "k",
                Entry::with_expiry(b"v".to_vec(), now_millis() - 1),
                PutMode::Overwrite,
            )
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.read("k").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_expire_then_read_absent() {
        let store = ShardedStore::new();
        store
            .write("k", Entry::new(b"v".to_vec()), PutMode::Overwrite)
            .unwrap();
        assert!(store.expire("k", now_millis() - 1));
        assert!(store.read("k").is_none());
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let store = Arc::new(ShardedStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..200 {
                        store
                            .write(
                                &format!("k{i}-{j}"),
                                Entry::new(vec![i as u8]),
                                PutMode::Overwrite,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 1_600);
    }

    #[test]
    fn test_iterate_early_stop() {
        let store = ShardedStore::new();
        for i in 0..10 {
            store
                .write(&format!("k{i}"), Entry::new(b"v".to_vec()), PutMode::Overwrite)
                .unwrap();
        }
        let mut count = 0;
        store.iterate(&mut |_, _| {
            count += 1;
            false
        });
        assert_eq!(count, 1);
    }
}
