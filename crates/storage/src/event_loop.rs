//! Single-threaded event-loop backend.
//!
//! Exactly one thread owns the underlying map and processes requests
//! sequentially from a bounded channel. Callers block on a per-request
//! reply channel, so every operation behaves like a synchronous call
//! while the map itself needs no locks at all.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

use keel_core::{Entry, Error, IterableStore, PutMode, Result, Store};

use crate::mem::MemTable;

/// Requests sent by caller threads to the loop thread.
///
/// Each request carries its own bounded reply channel; the loop never
/// blocks on a reply because every reply channel has capacity one.
enum Request {
    Read {
        key: String,
        reply: SyncSender<Option<Entry>>,
    },
    Write {
        key: String,
        entry: Entry,
        mode: PutMode,
        reply: SyncSender<Result<()>>,
    },
    Expire {
        key: String,
        deadline_ms: i64,
        reply: SyncSender<bool>,
    },
    // Iteration crosses the thread boundary by value: the loop clones the
    // live entries and the caller visits them locally.
    Collect {
        reply: SyncSender<Vec<(String, Entry)>>,
    },
    Shutdown {
        reply: SyncSender<()>,
    },
}

/// A store owned by a dedicated event-loop thread.
///
/// The channel buffer bounds backpressure: callers block once `buffer`
/// requests are in flight.
pub struct EventLoopStore {
    requests: SyncSender<Request>,
    closed: AtomicBool,
}

impl EventLoopStore {
    /// Spawn the owner thread and return a handle to it.
    pub fn new(buffer: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(buffer);
        thread::Builder::new()
            .name("keel-store-loop".to_string())
            .spawn(move || run_loop(rx))?;
        Ok(EventLoopStore {
            requests: tx,
            closed: AtomicBool::new(false),
        })
    }

    fn stopped() -> Error {
        Error::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "store event loop stopped",
        ))
    }
}

fn run_loop(requests: Receiver<Request>) {
    let mut table = MemTable::new();
    while let Ok(request) = requests.recv() {
        match request {
            Request::Read { key, reply } => {
                let _ = reply.send(table.read(&key));
            }
            Request::Write {
                key,
                entry,
                mode,
                reply,
            } => {
                let _ = reply.send(table.write(&key, entry, mode));
            }
            Request::Expire {
                key,
                deadline_ms,
                reply,
            } => {
                let _ = reply.send(table.expire(&key, deadline_ms));
            }
            Request::Collect { reply } => {
                let mut items = Vec::new();
                table.iterate(&mut |key, entry| {
                    items.push((key.to_string(), entry.clone()));
                    true
                });
                let _ = reply.send(items);
            }
            Request::Shutdown { reply } => {
                let _ = reply.send(());
                return;
            }
        }
    }
}

impl Store for EventLoopStore {
    fn read(&self, key: &str) -> Option<Entry> {
        let (reply, rx) = mpsc::sync_channel(1);
        let request = Request::Read {
            key: key.to_string(),
            reply,
        };
        if self.requests.send(request).is_err() {
            return None;
        }
        rx.recv().unwrap_or(None)
    }

    fn write(&self, key: &str, entry: Entry, mode: PutMode) -> Result<()> {
        let (reply, rx) = mpsc::sync_channel(1);
        let request = Request::Write {
            key: key.to_string(),
            entry,
            mode,
            reply,
        };
        if self.requests.send(request).is_err() {
            return Err(Self::stopped());
        }
        rx.recv().map_err(|_| Self::stopped())?
    }

    fn expire(&self, key: &str, deadline_ms: i64) -> bool {
        let (reply, rx) = mpsc::sync_channel(1);
        let request = Request::Expire {
            key: key.to_string(),
            deadline_ms,
            reply,
        };
        if self.requests.send(request).is_err() {
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (reply, rx) = mpsc::sync_channel(1);
        if self.requests.send(Request::Shutdown { reply }).is_err() {
            return Ok(());
        }
        let _ = rx.recv();
        Ok(())
    }
}

impl IterableStore for EventLoopStore {
    fn iterate(&self, visit: &mut dyn FnMut(&str, &Entry) -> bool) {
        let (reply, rx) = mpsc::sync_channel(1);
        if self.requests.send(Request::Collect { reply }).is_err() {
            return;
        }
        let Ok(items) = rx.recv() else { return };
        for (key, entry) in &items {
            if !visit(key, entry) {
                break;
            }
        }
    }
}
