//! Append-only write-ahead log with a single-writer worker thread.
//!
//! Concurrency model:
//! - any number of threads may call [`Wal::append`]; exactly one worker
//!   thread owns the file handle for the lifetime of the log
//! - producers hand requests over an unbuffered rendezvous channel and
//!   block on a per-request reply, so an acknowledged append has reached
//!   the durability point of the active [`SyncPolicy`]
//! - on-disk order equals hand-off order; the bytes on disk are always a
//!   prefix of the successfully acknowledged appends
//!
//! Record encoding runs on the producer thread, leaving the worker a pure
//! I/O executor.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

use keel_core::{Error, Result};

use crate::record::{decode_record, encode_record, Record};
use crate::worker::{Request, Worker, WorkerOp};

/// How long `close` waits for the worker to accept the shutdown hand-off
/// before reporting [`Error::WorkerStuck`]. A safety guard, not a
/// correctness mechanism.
const HANDOFF_DEADLINE: Duration = Duration::from_secs(1);

/// When the worker fsyncs relative to writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync after every write; append acknowledgement implies the record
    /// is on stable storage.
    EveryWrite,
    /// fsync on a periodic tick (and on rotation and close). Appends are
    /// acknowledged after the write reaches the OS buffer; the durability
    /// window is bounded by the interval.
    EveryInterval(Duration),
}

/// WAL construction parameters.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Path of the live log file; created if absent.
    pub path: PathBuf,
    /// Durability policy for the worker.
    pub sync_policy: SyncPolicy,
}

impl WalConfig {
    /// Config with the strongest policy, [`SyncPolicy::EveryWrite`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WalConfig {
            path: path.into(),
            sync_policy: SyncPolicy::EveryWrite,
        }
    }

    /// Replace the sync policy.
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }
}

/// Handle to an append-only write-ahead log.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Wal {
    // Kept so replay can re-open the file during recovery.
    path: PathBuf,
    // Unbuffered: every append waits for the worker's acknowledgement.
    requests: SyncSender<Request>,
    // Broadcast shutdown signal; lets appends fail fast without touching
    // a worker that may already have terminated.
    closed: AtomicBool,
}

impl Wal {
    /// Open (or create) the log at `config.path` and spawn its worker.
    pub fn open(config: WalConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        let (requests, receiver) = mpsc::sync_channel(0);
        let worker = Worker::new(file, config.path.clone(), config.sync_policy);
        thread::Builder::new()
            .name("keel-wal".to_string())
            .spawn(move || worker.run(receiver))?;

        Ok(Wal {
            path: config.path,
            requests,
            closed: AtomicBool::new(false),
        })
    }

    /// Durably record a mutation.
    ///
    /// Blocks until the record is written (and fsynced, under
    /// [`SyncPolicy::EveryWrite`]) and acknowledged. Encoding happens
    /// here, on the caller's thread. Returns [`Error::WalClosed`] once
    /// [`Wal::close`] has been signalled.
    pub fn append(&self, record: &Record) -> Result<()> {
        let payload = encode_record(record)?;
        self.submit(WorkerOp::Append { payload })
    }

    /// Force an fsync regardless of policy.
    pub fn sync(&self) -> Result<()> {
        self.submit(WorkerOp::Sync)
    }

    /// Archive the live log and start a fresh one.
    ///
    /// The worker fsyncs, renames the file to
    /// `<path>.<nanosecond-timestamp>`, and re-opens an empty log at the
    /// canonical path. Archived segments are never garbage-collected
    /// here; retention is an operator concern.
    pub fn rotate(&self) -> Result<()> {
        self.submit(WorkerOp::Rotate)
    }

    /// Reconstruct state by iterating the log in file order.
    ///
    /// A cold-start operation: it re-opens the file directly and does not
    /// involve the worker. Blank lines are skipped; the first decode or
    /// `apply` error aborts and surfaces.
    pub fn replay(&self, mut apply: impl FnMut(Record) -> Result<()>) -> Result<()> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            apply(decode_record(line)?)?;
        }
        Ok(())
    }

    /// Flush and shut down the log. Idempotent.
    ///
    /// The first call broadcasts the shutdown signal (unblocking append
    /// fast paths), then hands the worker a close request. If the worker
    /// does not accept the hand-off within one second it is assumed
    /// wedged and [`Error::WorkerStuck`] is returned; the process should
    /// exit rather than continue on a log of unknown state.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (reply, acknowledgement) = mpsc::sync_channel(1);
        let mut request = Request {
            op: WorkerOp::Close,
            reply,
        };

        // A rendezvous try_send only succeeds against a worker parked in
        // recv, which is exactly the hand-off the deadline guards.
        let deadline = Instant::now() + HANDOFF_DEADLINE;
        loop {
            match self.requests.try_send(request) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return Err(Error::WorkerStuck);
                    }
                    request = returned;
                    thread::sleep(Duration::from_millis(1));
                }
                // Worker already gone; nothing left to flush.
                Err(TrySendError::Disconnected(_)) => return Ok(()),
            }
        }

        acknowledgement.recv().map_err(|_| Error::WalClosed)?
    }

    /// Path of the live log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn submit(&self, op: WorkerOp) -> Result<()> {
        // Fast path: never attempt a hand-off after shutdown has been
        // signalled; the worker may have already returned.
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::WalClosed);
        }

        let (reply, acknowledgement) = mpsc::sync_channel(1);
        self.requests
            .send(Request { op, reply })
            .map_err(|_| Error::WalClosed)?;
        acknowledgement.recv().map_err(|_| Error::WalClosed)?
    }
}
