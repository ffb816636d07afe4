//! The WAL worker: sole owner of the log file handle.
//!
//! Exactly one thread executes [`Worker::run`] for the lifetime of a WAL.
//! All file I/O is serialized through the request channel, so there are
//! no locks around file operations and writes land in hand-off order.
//! Payloads arrive pre-encoded; the worker performs only I/O.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::time::Instant;

use chrono::Utc;
use keel_core::Result;
use tracing::debug;

use crate::wal::SyncPolicy;

/// Work items accepted by the worker.
pub(crate) enum WorkerOp {
    /// Write a pre-encoded record line (fsync per policy).
    Append {
        /// Encoded line, LF terminator included.
        payload: String,
    },
    /// fsync now.
    Sync,
    /// fsync, archive the live file, open a fresh one.
    Rotate,
    /// Best-effort fsync, close the file, terminate the loop.
    Close,
}

/// A single unit of work plus its reply channel.
pub(crate) struct Request {
    pub(crate) op: WorkerOp,
    pub(crate) reply: SyncSender<Result<()>>,
}

pub(crate) struct Worker {
    file: File,
    path: PathBuf,
    policy: SyncPolicy,
}

impl Worker {
    pub(crate) fn new(file: File, path: PathBuf, policy: SyncPolicy) -> Self {
        Worker { file, path, policy }
    }

    /// The WAL event loop. Returns when a close request is served or
    /// every producer handle has been dropped.
    pub(crate) fn run(mut self, requests: Receiver<Request>) {
        match self.policy {
            SyncPolicy::EveryWrite => {
                while let Ok(request) = requests.recv() {
                    if self.dispatch(request) {
                        return;
                    }
                }
            }
            SyncPolicy::EveryInterval(interval) => {
                let mut next_tick = Instant::now() + interval;
                loop {
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match requests.recv_timeout(wait) {
                        Ok(request) => {
                            if self.dispatch(request) {
                                return;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            // Periodic flush; errors surface on the next
                            // explicit sync or close.
                            let _ = self.file.sync_all();
                            next_tick = Instant::now() + interval;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        }
        // All handles dropped without an explicit close: flush what we
        // have before the file handle goes away.
        let _ = self.file.sync_all();
    }

    /// Serve one request. Returns true when the loop must terminate.
    fn dispatch(&mut self, request: Request) -> bool {
        match request.op {
            WorkerOp::Append { payload } => {
                let result = self.append(&payload);
                let _ = request.reply.send(result);
                false
            }
            WorkerOp::Sync => {
                let result = self.file.sync_all().map_err(Into::into);
                let _ = request.reply.send(result);
                false
            }
            WorkerOp::Rotate => {
                let result = self.rotate();
                let _ = request.reply.send(result);
                false
            }
            WorkerOp::Close => {
                let _ = self.file.sync_all();
                let _ = request.reply.send(Ok(()));
                true
            }
        }
    }

    fn append(&mut self, payload: &str) -> Result<()> {
        self.file.write_all(payload.as_bytes())?;
        if self.policy == SyncPolicy::EveryWrite {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Archive the live log under a timestamped name and start fresh.
    ///
    /// The fsync precedes the rename so the archive is complete; the new
    /// file replaces the owned handle and the old one closes on drop.
    fn rotate(&mut self) -> Result<()> {
        self.file.sync_all()?;

        let archive = archive_path(&self.path);
        fs::rename(&self.path, &archive)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        debug!(archive = %archive.display(), "rotated wal segment");
        Ok(())
    }
}

/// `<path>.<nanosecond-timestamp>`
fn archive_path(path: &Path) -> PathBuf {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{nanos}"));
    PathBuf::from(name)
}
