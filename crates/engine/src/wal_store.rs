//! The durability decorator.
//!
//! `WalStore` wraps an in-memory backend and persists every mutation to
//! the write-ahead log before making it visible in memory. On startup it
//! rebuilds state by loading the snapshot baseline (if one exists) and
//! replaying the WAL on top, in file order.
//!
//! Consistency choices:
//! - reads bypass the WAL entirely and run at memory speed
//! - writes pre-validate against memory so a semantically rejected write
//!   (`IfAbsent` on a present key, `Update` on an absent one) never
//!   produces a log record
//! - a failed append aborts the operation before memory is touched, so
//!   memory never runs ahead of disk

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keel_core::{Entry, Error, IterableStore, PutMode, Result, Store};
use keel_durability::{load_snapshot, Record, Wal};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::compaction::Supervisor;

/// Construction parameters for [`WalStore`].
#[derive(Debug, Clone)]
pub struct WalStoreOptions {
    /// Path of the active snapshot file. A `snapshot-*.bin` temp file
    /// appears transiently in the same directory during compaction.
    pub snapshot_path: PathBuf,
    /// Interval of the background compaction supervisor; `None` (or a
    /// zero duration) disables it. Compaction can still be invoked
    /// explicitly.
    pub compaction_interval: Option<Duration>,
}

impl WalStoreOptions {
    /// Options with background compaction disabled.
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        WalStoreOptions {
            snapshot_path: snapshot_path.into(),
            compaction_interval: None,
        }
    }

    /// Enable the periodic compaction supervisor.
    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = Some(interval);
        self
    }
}

/// A crash-consistent decorator over an in-memory store.
///
/// Generic over any backend with the iteration capability; compaction
/// needs to stream live entries, so the bound is part of the type rather
/// than a runtime check.
pub struct WalStore<S> {
    pub(crate) store: S,
    pub(crate) wal: Wal,
    pub(crate) snapshot_path: PathBuf,
    // Writers share this lock; compaction takes it exclusively. The one
    // primitive coordinating operations with compaction.
    pub(crate) compaction_lock: RwLock<()>,
    pub(crate) supervisor: Mutex<Option<Supervisor>>,
    closed: AtomicBool,
}

impl<S: IterableStore + 'static> WalStore<S> {
    /// Recover state from disk and return the ready store.
    ///
    /// Recovery is synchronous: no operation is served until the snapshot
    /// has loaded and the WAL has fully replayed. Any snapshot load
    /// error, decode error, or replay apply error aborts construction;
    /// the system does not boot into an ambiguous state.
    pub fn open(store: S, wal: Wal, options: WalStoreOptions) -> Result<Arc<Self>> {
        Self::load_snapshot_into(&store, &options.snapshot_path)?;
        Self::replay_into(&store, &wal)?;

        let durable = Arc::new(WalStore {
            store,
            wal,
            snapshot_path: options.snapshot_path,
            compaction_lock: RwLock::new(()),
            supervisor: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        if let Some(interval) = options.compaction_interval.filter(|i| !i.is_zero()) {
            durable.start_supervisor(interval)?;
        }
        Ok(durable)
    }

    /// Access the wrapped backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn load_snapshot_into(store: &S, snapshot_path: &Path) -> Result<()> {
        let mut file = match File::open(snapshot_path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %snapshot_path.display(), "no snapshot, starting from wal only");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let mut loaded = 0usize;
        let mut apply_err = None;
        load_snapshot(&mut file, |item| {
            if apply_err.is_some() {
                return;
            }
            let entry = Entry {
                value: item.value,
                expires_at_ms: item.expires_at_ms,
            };
            if let Err(err) = store.write(&item.key, entry, PutMode::Overwrite) {
                apply_err = Some(err);
                return;
            }
            loaded += 1;
        })?;
        if let Some(err) = apply_err {
            return Err(err);
        }

        info!(items = loaded, "loaded snapshot baseline");
        Ok(())
    }

    fn replay_into(store: &S, wal: &Wal) -> Result<()> {
        let mut replayed = 0u64;
        wal.replay(|record| {
            match record {
                // The log is the definitive history: replaying overwrites
                // in order converges on the correct final state.
                Record::Set { key, value } => {
                    store.write(
                        &key,
                        Entry {
                            value,
                            expires_at_ms: 0,
                        },
                        PutMode::Overwrite,
                    )?;
                }
                Record::Expire { key, deadline_ms } => {
                    if deadline_ms < 0 {
                        return Err(Error::InvalidRecord);
                    }
                    // A missing key here would mean the log was reordered;
                    // replay preserves file order, so ignore the bool.
                    let _ = store.expire(&key, deadline_ms);
                }
            }
            replayed += 1;
            Ok(())
        })?;

        info!(records = replayed, "replayed wal");
        Ok(())
    }
}

impl<S: IterableStore + 'static> Store for WalStore<S> {
    /// Memory-speed read; no WAL involvement, no compaction lock.
    fn read(&self, key: &str) -> Option<Entry> {
        self.store.read(key)
    }

    /// Durable write: validate in memory, append to the WAL, then apply.
    fn write(&self, key: &str, mut entry: Entry, mode: PutMode) -> Result<()> {
        let _shared = self.compaction_lock.read();

        // Fail fast against memory so rejected writes never reach disk.
        match mode {
            PutMode::IfAbsent => {
                if self.store.read(key).is_some() {
                    return Err(Error::KeyExists);
                }
            }
            PutMode::Update => {
                if self.store.read(key).is_none() {
                    return Err(Error::KeyNotFound);
                }
            }
            PutMode::Overwrite => {}
        }

        // Writes reset TTL; expiry is only ever set through expire().
        entry.expires_at_ms = 0;

        self.wal.append(&Record::Set {
            key: key.to_string(),
            value: entry.value.clone(),
        })?;

        // Only after disk success does the write become visible.
        self.store.write(key, entry, mode)
    }

    /// Durable TTL update. Fails closed: if the record cannot be
    /// persisted, the operation reports failure and memory is untouched.
    fn expire(&self, key: &str, deadline_ms: i64) -> bool {
        let _shared = self.compaction_lock.read();

        if self.store.read(key).is_none() {
            return false;
        }
        // Zero is rejected along with negatives: on a stored entry, zero
        // means "no expiry", so it cannot double as a deadline.
        if deadline_ms <= 0 {
            return false;
        }

        let record = Record::Expire {
            key: key.to_string(),
            deadline_ms,
        };
        if self.wal.append(&record).is_err() {
            return false;
        }

        self.store.expire(key, deadline_ms)
    }

    /// Shut down: supervisor, final compaction, WAL, backend. Idempotent;
    /// calls after the first return `Ok`.
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(supervisor) = self.supervisor.lock().take() {
            supervisor.stop();
        }

        // Best-effort: a failed final compaction must not block shutdown;
        // the WAL still holds everything the snapshot would have.
        if let Err(err) = self.compact() {
            warn!(error = %err, "final compaction failed");
        }

        let wal_result = self.wal.close();
        let store_result = self.store.close();
        wal_result.and(store_result)
    }
}

impl<S: IterableStore + 'static> IterableStore for WalStore<S> {
    fn iterate(&self, visit: &mut dyn FnMut(&str, &Entry) -> bool) {
        self.store.iterate(visit)
    }
}

impl<S> std::fmt::Debug for WalStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalStore")
            .field("wal_path", &self.wal.path())
            .field("snapshot_path", &self.snapshot_path)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
