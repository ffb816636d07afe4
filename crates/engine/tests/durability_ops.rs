//! Cross-backend durability semantics.
//!
//! Every case runs against each in-memory backend, since the decorator
//! must stay correct over any store honoring the capability contract.

use std::sync::Arc;
use std::thread;

use keel_core::{now_millis, Entry, Error, IterableStore, PutMode, Store};
use keel_durability::{Record, Wal, WalConfig};
use keel_engine::{WalStore, WalStoreOptions};
use keel_storage::{EventLoopStore, LockedStore, ShardedStore};
use tempfile::TempDir;

fn open_wal(dir: &TempDir) -> Wal {
    Wal::open(WalConfig::new(dir.path().join("wal.log"))).unwrap()
}

fn options(dir: &TempDir) -> WalStoreOptions {
    WalStoreOptions::new(dir.path().join("snapshot.bin"))
}

fn wal_records(dir: &TempDir) -> Vec<Record> {
    let wal = open_wal(dir);
    let mut records = Vec::new();
    wal.replay(|record| {
        records.push(record);
        Ok(())
    })
    .unwrap();
    wal.close().unwrap();
    records
}

fn persistence_case<S: IterableStore + 'static>(make: impl Fn() -> S) {
    let dir = TempDir::new().unwrap();
    let store = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();

    store
        .write("pkey", Entry::new(b"pval".to_vec()), PutMode::Overwrite)
        .unwrap();
    let got = store.read("pkey").unwrap();
    assert_eq!(got.value, b"pval");
}

fn recovery_case<S: IterableStore + 'static>(make: impl Fn() -> S) {
    let dir = TempDir::new().unwrap();
    {
        let store = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();
        store
            .write("survivor", Entry::new(b"alive".to_vec()), PutMode::Overwrite)
            .unwrap();
        // Dropped without close: a crash, from recovery's point of view.
    }

    let recovered = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();
    assert_eq!(recovered.read("survivor").unwrap().value, b"alive");
}

fn phantom_write_case<S: IterableStore + 'static>(make: impl Fn() -> S) {
    let dir = TempDir::new().unwrap();
    {
        let store = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();
        store
            .write("exists", Entry::new(b"v1".to_vec()), PutMode::Overwrite)
            .unwrap();

        let err = store
            .write("exists", Entry::new(b"v2".to_vec()), PutMode::IfAbsent)
            .unwrap_err();
        assert!(matches!(err, Error::KeyExists));

        // Memory kept the original value.
        assert_eq!(store.read("exists").unwrap().value, b"v1");
    }

    // And the rejected value never reached the log.
    let records = wal_records(&dir);
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0],
        Record::Set {
            key: "exists".to_string(),
            value: b"v1".to_vec()
        }
    );
}

fn update_absent_case<S: IterableStore + 'static>(make: impl Fn() -> S) {
    let dir = TempDir::new().unwrap();
    {
        let store = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();
        let err = store
            .write("ghost", Entry::new(b"v".to_vec()), PutMode::Update)
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound));
    }
    assert!(wal_records(&dir).is_empty());
}

fn ordering_case<S: IterableStore + 'static>(make: impl Fn() -> S) {
    let dir = TempDir::new().unwrap();
    {
        let store = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();
        store
            .write("k", Entry::new(b"1".to_vec()), PutMode::Overwrite)
            .unwrap();
        store
            .write("k", Entry::new(b"2".to_vec()), PutMode::Overwrite)
            .unwrap();
    }

    // Recovery replays in file order regardless of which backend wrote.
    let recovered = WalStore::open(LockedStore::new(), open_wal(&dir), options(&dir)).unwrap();
    assert_eq!(recovered.read("k").unwrap().value, b"2");
}

fn expire_absent_not_logged_case<S: IterableStore + 'static>(make: impl Fn() -> S) {
    let dir = TempDir::new().unwrap();
    {
        let store = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();
        assert!(!store.expire("missing", now_millis() + 60_000));
    }
    assert!(wal_records(&dir).is_empty());
}

fn write_count_case<S: IterableStore + 'static>(make: impl Fn() -> S) {
    const THREADS: usize = 8;
    const WRITES: usize = 25;

    let dir = TempDir::new().unwrap();
    {
        let store = WalStore::open(make(), open_wal(&dir), options(&dir)).unwrap();
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..WRITES {
                        store
                            .write(
                                &format!("k{i}-{j}"),
                                Entry::new(b"v".to_vec()),
                                PutMode::Overwrite,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    assert_eq!(wal_records(&dir).len(), THREADS * WRITES);
}

#[test]
fn test_persistence_all_backends() {
    persistence_case(LockedStore::new);
    persistence_case(ShardedStore::new);
    persistence_case(|| EventLoopStore::new(64).unwrap());
}

#[test]
fn test_recovery_all_backends() {
    recovery_case(LockedStore::new);
    recovery_case(ShardedStore::new);
    recovery_case(|| EventLoopStore::new(64).unwrap());
}

#[test]
fn test_phantom_write_protection_all_backends() {
    phantom_write_case(LockedStore::new);
    phantom_write_case(ShardedStore::new);
    phantom_write_case(|| EventLoopStore::new(64).unwrap());
}

#[test]
fn test_update_absent_never_logged_all_backends() {
    update_absent_case(LockedStore::new);
    update_absent_case(ShardedStore::new);
    update_absent_case(|| EventLoopStore::new(64).unwrap());
}

#[test]
fn test_ordering_all_backends() {
    ordering_case(LockedStore::new);
    ordering_case(ShardedStore::new);
    ordering_case(|| EventLoopStore::new(64).unwrap());
}

#[test]
fn test_expire_absent_not_logged_all_backends() {
    expire_absent_not_logged_case(LockedStore::new);
    expire_absent_not_logged_case(ShardedStore::new);
    expire_absent_not_logged_case(|| EventLoopStore::new(64).unwrap());
}

#[test]
fn test_wal_record_count_matches_successful_writes() {
    write_count_case(LockedStore::new);
    write_count_case(|| EventLoopStore::new(64).unwrap());
}

#[test]
fn test_expire_zero_deadline_rejected() {
    let dir = TempDir::new().unwrap();
    {
        let store = WalStore::open(LockedStore::new(), open_wal(&dir), options(&dir)).unwrap();
        store
            .write("k", Entry::new(b"v".to_vec()), PutMode::Overwrite)
            .unwrap();
        assert!(!store.expire("k", 0));
        assert!(!store.expire("k", -5));
    }

    let records = wal_records(&dir);
    assert!(records.iter().all(|r| !matches!(r, Record::Expire { .. })));
}

#[test]
fn test_write_resets_ttl() {
    let dir = TempDir::new().unwrap();
    let store = WalStore::open(LockedStore::new(), open_wal(&dir), options(&dir)).unwrap();

    store
        .write("k", Entry::new(b"v".to_vec()), PutMode::Overwrite)
        .unwrap();
    assert!(store.expire("k", now_millis() + 60_000));

    // TTL is only ever attached through expire(); a caller-set deadline
    // on the entry itself is discarded.
    store
        .write(
            "k",
            Entry::with_expiry(b"v2".to_vec(), now_millis() + 1),
            PutMode::Overwrite,
        )
        .unwrap();
    assert_eq!(store.read("k").unwrap().expires_at_ms, 0);
}
