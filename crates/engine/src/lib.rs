//! Durable store engine for keel
//!
//! [`WalStore`] decorates any in-memory backend implementing
//! [`keel_core::IterableStore`] with crash-consistent durability:
//!
//! - startup recovery: snapshot baseline, then WAL replay, in that order
//! - every mutation is ordered *validate → append WAL → mutate memory*,
//!   so nothing semantically rejected ever reaches disk and nothing is
//!   visible in memory that is not already durable (per sync policy)
//! - stop-the-world compaction materializes a fresh snapshot and rotates
//!   the WAL so recovery work stays bounded
//!
//! The WAL remains the source of truth; snapshots are a derived
//! optimization and compaction failures never affect correctness.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod compaction;
mod wal_store;

pub use wal_store::{WalStore, WalStoreOptions};
