//! Binary snapshot codec.
//!
//! A snapshot is zero or more items, concatenated, little-endian, with no
//! header or trailer:
//!
//! ```text
//! [key_len: i32][key][value_len: i32][value][expires_at_ms: i64]
//! ```
//!
//! Writing streams items one at a time through a push-based yielder, so
//! the full dataset is never buffered. Loading is all-or-nothing: EOF at
//! an item boundary is success, anything else is corruption and the
//! caller must discard every item.

use std::io::{self, Read, Write};

use keel_core::{Error, Result};

/// A single persisted entry.
///
/// A deliberately minimal DTO: the codec does not depend on any store
/// type, so it stays a stable persistence boundary while store internals
/// evolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotItem {
    /// Key text.
    pub key: String,
    /// Raw value bytes.
    pub value: Vec<u8>,
    /// Absolute expiry deadline in Unix milliseconds; 0 means none.
    pub expires_at_ms: i64,
}

/// Serialize a stream of items into `writer`.
///
/// `stream` is a push-based producer: it calls the yielder once per item
/// and must stop when the yielder returns false, which happens after the
/// first write error. The error surfaces from this function; an empty
/// stream produces a valid zero-byte snapshot.
pub fn write_snapshot<W: Write>(
    writer: &mut W,
    stream: impl FnOnce(&mut dyn FnMut(SnapshotItem) -> bool),
) -> Result<()> {
    let mut write_err: Option<io::Error> = None;

    stream(&mut |item: SnapshotItem| {
        if write_err.is_some() {
            return false;
        }
        if let Err(err) = write_item(writer, &item) {
            write_err = Some(err);
            return false;
        }
        true
    });

    match write_err {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn write_item<W: Write>(writer: &mut W, item: &SnapshotItem) -> io::Result<()> {
    writer.write_all(&(item.key.len() as i32).to_le_bytes())?;
    writer.write_all(item.key.as_bytes())?;
    writer.write_all(&(item.value.len() as i32).to_le_bytes())?;
    writer.write_all(&item.value)?;
    writer.write_all(&item.expires_at_ms.to_le_bytes())?;
    Ok(())
}

/// Reconstruct items from `reader`, delegating application to `apply`.
///
/// Returns `Ok` only on clean EOF at an item boundary. A negative length
/// field or a stream that ends mid-item yields [`Error::UnexpectedEnd`];
/// other read failures pass through. `apply` is called only with fully
/// read items, so a failed load applies nothing beyond the last complete
/// item — and callers abort on any error, applying zero items overall.
pub fn load_snapshot<R: Read>(reader: &mut R, mut apply: impl FnMut(SnapshotItem)) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        if !fill_or_eof(reader, &mut len_buf)? {
            return Ok(()); // clean end of stream
        }
        let key_len = i32::from_le_bytes(len_buf);
        if key_len < 0 {
            return Err(Error::UnexpectedEnd);
        }
        let mut key_bytes = vec![0u8; key_len as usize];
        read_field(reader, &mut key_bytes)?;

        read_field(reader, &mut len_buf)?;
        let value_len = i32::from_le_bytes(len_buf);
        if value_len < 0 {
            return Err(Error::UnexpectedEnd);
        }
        let mut value = vec![0u8; value_len as usize];
        read_field(reader, &mut value)?;

        let mut expires_buf = [0u8; 8];
        read_field(reader, &mut expires_buf)?;

        let key = String::from_utf8(key_bytes).map_err(|_| Error::UnexpectedEnd)?;
        apply(SnapshotItem {
            key,
            value,
            expires_at_ms: i64::from_le_bytes(expires_buf),
        });
    }
}

/// Fill `buf` completely, or report clean EOF if the stream ends before
/// the first byte. EOF partway through the buffer is corruption.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(Error::UnexpectedEnd),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

/// Fill `buf` completely; any shortfall mid-item is corruption.
fn read_field<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEnd
        } else {
            Error::Io(err)
        }
    })
}
