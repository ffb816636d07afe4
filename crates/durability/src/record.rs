//! Textual record codec for the write-ahead log.
//!
//! One record per LF-terminated line, human-readable commands, base64 for
//! values so arbitrary bytes stay whitespace- and newline-safe:
//!
//! ```text
//! SET <key> <base64(value)>
//! EXPIRE <key> <deadline_ms>
//! ```
//!
//! Decoding is intentionally strict: a malformed line fails replay
//! immediately. There is no skip-bad-record path; either the log is valid
//! or recovery stops.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keel_core::{Error, Result};

const COMMAND_SET: &str = "SET";
const COMMAND_EXPIRE: &str = "EXPIRE";

/// A single durable mutation, protocol-agnostic.
///
/// Records mirror logical operations rather than store internals, keeping
/// the persistence boundary stable across backend refactors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Bind `key` to `value`, clearing any expiry.
    Set {
        /// Key; any non-empty run of non-whitespace characters.
        key: String,
        /// Raw value bytes.
        value: Vec<u8>,
    },
    /// Attach an absolute expiry deadline to `key`.
    Expire {
        /// Key; any non-empty run of non-whitespace characters.
        key: String,
        /// Deadline in Unix milliseconds; never negative in a valid record.
        deadline_ms: i64,
    },
}

/// Encode a record as a single LF-terminated log line.
///
/// Fails with [`Error::InvalidRecord`] on an empty key, an empty `SET`
/// value, or a negative `EXPIRE` deadline.
pub fn encode_record(record: &Record) -> Result<String> {
    match record {
        Record::Set { key, value } => {
            if key.is_empty() || value.is_empty() {
                return Err(Error::InvalidRecord);
            }
            Ok(format!("{COMMAND_SET} {key} {}\n", STANDARD.encode(value)))
        }
        Record::Expire { key, deadline_ms } => {
            if key.is_empty() || *deadline_ms < 0 {
                return Err(Error::InvalidRecord);
            }
            Ok(format!("{COMMAND_EXPIRE} {key} {deadline_ms}\n"))
        }
    }
}

/// Decode one log line (without its terminator) back into a [`Record`].
///
/// Surrounding whitespace is trimmed and fields are split on whitespace
/// runs. The command token is case-insensitive; operands are not. Invalid
/// base64 in a `SET` value surfaces as [`Error::Base64`]; every other
/// malformed shape is [`Error::InvalidRecord`].
pub fn decode_record(line: &str) -> Result<Record> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::InvalidRecord);
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts[0].to_ascii_uppercase().as_str() {
        COMMAND_SET => {
            if parts.len() != 3 {
                return Err(Error::InvalidRecord);
            }
            let value = STANDARD.decode(parts[2])?;
            Ok(Record::Set {
                key: parts[1].to_string(),
                value,
            })
        }
        COMMAND_EXPIRE => {
            if parts.len() != 3 {
                return Err(Error::InvalidRecord);
            }
            let deadline_ms = parts[2]
                .parse::<i64>()
                .map_err(|_| Error::InvalidRecord)?;
            Ok(Record::Expire {
                key: parts[1].to_string(),
                deadline_ms,
            })
        }
        _ => Err(Error::InvalidRecord),
    }
}
