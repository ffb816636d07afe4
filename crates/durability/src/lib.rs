//! Durability layer for keel
//!
//! This crate implements the two persistence formats and the machinery
//! around them:
//! - [`record`]: one-line textual encoding of logical mutations
//! - [`wal`]: the append-only write-ahead log, owned by a single worker
//!   thread; producers hand requests over a rendezvous channel
//! - [`snapshot`]: length-prefixed little-endian snapshot codec with
//!   all-or-nothing load semantics
//!
//! The WAL records intent (`SET`, `EXPIRE`), never internal store state,
//! so storage backends can evolve without a log format change.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod record;
pub mod snapshot;
pub mod wal;
mod worker;

pub use record::{decode_record, encode_record, Record};
pub use snapshot::{load_snapshot, write_snapshot, SnapshotItem};
pub use wal::{SyncPolicy, Wal, WalConfig};
