//! Core types for the keel key-value store
//!
//! This crate defines the vocabulary shared by every layer of the system:
//! - [`Entry`]: a stored value with optional expiry
//! - [`PutMode`]: write semantics (overwrite / if-absent / update)
//! - [`Store`] and [`IterableStore`]: the capability interface an
//!   in-memory backend must provide to the durability layer
//! - [`Error`] and [`Result`]: the canonical error surface
//!
//! Nothing in this crate touches the filesystem or spawns threads; it is
//! the stable boundary between storage backends and the durability layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{IterableStore, Store};
pub use types::{now_millis, Entry, PutMode};
