//! Unified error types for keel.
//!
//! A single canonical enum covers the whole error surface: write-semantics
//! violations, WAL lifecycle errors, codec corruption, and I/O passthrough.
//! Callers are expected to match on the kind; validation errors are
//! recoverable locally, everything else aborts the operation.

use thiserror::Error;

/// All keel errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A record failed validation before encoding, or a WAL line could not
    /// be decoded during replay.
    #[error("invalid record")]
    InvalidRecord,

    /// The WAL has been closed; no further appends or rotations are
    /// accepted.
    #[error("wal is closed")]
    WalClosed,

    /// The WAL worker did not accept a shutdown hand-off within the safety
    /// deadline. Diagnostic only: the process should exit.
    #[error("wal worker stuck")]
    WorkerStuck,

    /// Write rejected: the key already exists (`PutMode::IfAbsent`).
    #[error("key already exists")]
    KeyExists,

    /// Write rejected: the key does not exist (`PutMode::Update`).
    #[error("key not found")]
    KeyNotFound,

    /// The requested put mode is not recognized by the backend.
    #[error("invalid put mode")]
    InvalidPutMode,

    /// A `SET` value in the WAL was not valid standard base64. Fatal to
    /// replay, same as [`Error::InvalidRecord`].
    #[error("invalid base64 value: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A snapshot stream ended mid-item or carried a negative length
    /// field. The snapshot must be discarded, never partially applied.
    #[error("unexpected end of snapshot stream")]
    UnexpectedEnd,

    /// I/O error from the filesystem (open, write, fsync, rename, read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for keel operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check whether this error is a local validation rejection.
    ///
    /// Validation errors never reach disk and leave both memory and the
    /// WAL untouched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidRecord
                | Error::KeyExists
                | Error::KeyNotFound
                | Error::InvalidPutMode
        )
    }

    /// Check whether this error is fatal to recovery.
    ///
    /// Any decode or corruption error observed while replaying the WAL or
    /// loading a snapshot aborts startup; the system does not boot into an
    /// ambiguous state.
    pub fn is_recovery_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidRecord | Error::Base64(_) | Error::UnexpectedEnd | Error::Io(_)
        )
    }
}
