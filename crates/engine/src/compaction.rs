//! Snapshot compaction and its background supervisor.
//!
//! Compaction is stop-the-world for writers: it takes the compaction
//! lock exclusively, streams every live entry into a temp file next to
//! the snapshot path, fsyncs, atomically promotes it, and only then
//! rotates the WAL. Readers proceed throughout. On any failure the temp
//! file is removed and the previous snapshot (if any) survives intact.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use keel_core::{Error, IterableStore, Result};
use keel_durability::{write_snapshot, SnapshotItem};
use tracing::{debug, warn};

use crate::wal_store::WalStore;

impl<S: IterableStore + 'static> WalStore<S> {
    /// Produce a fresh snapshot and rotate the WAL.
    ///
    /// Sequence: exclusive lock → temp file → stream live entries →
    /// fsync → atomic rename → WAL rotation. The rotation happens only
    /// after the snapshot is durable, so recovery always sees a snapshot
    /// that covers everything the rotated-away log contained.
    pub fn compact(&self) -> Result<()> {
        let _exclusive = self.compaction_lock.write();

        let dir = snapshot_dir(&self.snapshot_path);
        fs::create_dir_all(&dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix("snapshot-")
            .suffix(".bin")
            .tempfile_in(&dir)?;

        write_snapshot(temp.as_file_mut(), |yield_item| {
            self.store.iterate(&mut |key, entry| {
                yield_item(SnapshotItem {
                    key: key.to_string(),
                    value: entry.value.clone(),
                    expires_at_ms: entry.expires_at_ms,
                })
            });
        })?;

        temp.as_file().sync_all()?;

        // Atomic promotion; a failure here leaves the prior snapshot in
        // place and drops (deletes) the temp file.
        temp.persist(&self.snapshot_path)
            .map_err(|persist_err| Error::Io(persist_err.error))?;

        debug!(path = %self.snapshot_path.display(), "snapshot promoted");

        // A rotation failure is surfaced, but the snapshot stays valid
        // and the un-rotated WAL still replays correctly over it.
        self.wal.rotate()
    }

    /// Spawn the periodic compaction supervisor.
    pub(crate) fn start_supervisor(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let (shutdown, signal) = mpsc::sync_channel::<()>(1);
        let durable: Weak<Self> = Arc::downgrade(self);

        let handle = thread::Builder::new()
            .name("keel-compactor".to_string())
            .spawn(move || loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(durable) = durable.upgrade() else {
                            return;
                        };
                        // Snapshots are best-effort; the WAL remains the
                        // source of truth.
                        if let Err(err) = durable.compact() {
                            warn!(error = %err, "periodic compaction failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            })?;

        *self.supervisor.lock() = Some(Supervisor { shutdown, handle });
        Ok(())
    }
}

/// Handle to the running supervisor thread.
pub(crate) struct Supervisor {
    shutdown: SyncSender<()>,
    handle: JoinHandle<()>,
}

impl Supervisor {
    /// Signal shutdown and wait for the thread to exit.
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
    }
}

fn snapshot_dir(snapshot_path: &Path) -> PathBuf {
    match snapshot_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
