//! Binary record codec.
//!
//! Every record is a fixed header followed by the key and value payloads:
//!
//! ```text
//! [key_size: u32 LE][value_size: u64 LE][crc32: u32 LE][expiry: i64 LE]
//! [key bytes][value bytes][8 reserved bytes]
//! ```
//!
//! `crc32` is CRC-32/IEEE over the **value bytes only**. `expiry` is an
//! absolute Unix timestamp in nanoseconds (UTC); zero means the entry never
//! expires. The 8 reserved trailing bytes were introduced with on-disk
//! version 1 and are written as zeroes.
//!
//! An entry with an empty value is a tombstone: it marks the key as deleted
//! at that point in the log.

use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};

use crate::DatafileError;

/// Size in bytes of the fixed record header
/// (`key_size` + `value_size` + `crc32` + `expiry`).
pub const META_INFO_SIZE: u64 = 4 + 8 + 4 + 8;

/// Reserved bytes appended after every record since on-disk version 1.
/// Version-0 datafiles omit them.
pub const V1_PADDING: u64 = 8;

/// Safety cap applied while streaming records whose declared sizes are not
/// bounded by configuration. Anything larger is treated as corruption
/// rather than allocated.
const MAX_RECORD_SIZE: u64 = 64 * 1024 * 1024;

/// A single logical record: key, value, optional expiry, and the checksum
/// of the value as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The lookup key. Never empty for records written by the engine.
    pub key: Vec<u8>,
    /// The payload. Empty denotes a tombstone.
    pub value: Vec<u8>,
    /// Absolute expiry as Unix nanoseconds UTC; `None` never expires.
    pub expiry: Option<i64>,
    /// CRC-32/IEEE over the value bytes only.
    pub checksum: u32,
}

impl Entry {
    /// Builds an entry, computing the value checksum.
    pub fn new(key: Vec<u8>, value: Vec<u8>, expiry: Option<i64>) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(&value);
        let checksum = hasher.finalize();
        Self {
            key,
            value,
            expiry,
            checksum,
        }
    }

    /// Recomputes the value checksum and compares it with the stored one.
    pub fn verify_checksum(&self) -> bool {
        let mut hasher = Crc32::new();
        hasher.update(&self.value);
        hasher.finalize() == self.checksum
    }

    /// Encoded on-disk size of this entry, header and reserved bytes included.
    pub fn encoded_size(&self) -> u64 {
        META_INFO_SIZE + self.key.len() as u64 + self.value.len() as u64 + V1_PADDING
    }
}

/// Appends the encoded record frame to `buf`, returning the number of bytes
/// written. Writing into a `Vec` cannot fail, so the encoder is infallible.
pub fn encode(entry: &Entry, buf: &mut Vec<u8>) -> u64 {
    let start = buf.len();
    buf.extend_from_slice(&(entry.key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(entry.value.len() as u64).to_le_bytes());
    buf.extend_from_slice(&entry.checksum.to_le_bytes());
    buf.extend_from_slice(&entry.expiry.unwrap_or(0).to_le_bytes());
    buf.extend_from_slice(&entry.key);
    buf.extend_from_slice(&entry.value);
    buf.extend_from_slice(&[0u8; V1_PADDING as usize]);
    (buf.len() - start) as u64
}

/// Reads the next record from `rdr`, verifying its CRC.
///
/// Used for recovery replay and sequential scans.
///
/// # Termination
///
/// - **Clean EOF** at a record boundary -> `Ok(None)`.
/// - **Torn record** (EOF mid-header or mid-payload) -> `Corrupt`.
/// - **Size-bound violation** or **CRC mismatch** -> `Corrupt`.
/// - **I/O error** -> `Io`.
pub fn decode_stream<R: Read>(
    rdr: &mut R,
    max_key_size: u32,
    max_value_size: u64,
) -> Result<Option<(Entry, u64)>, DatafileError> {
    // EOF on the very first header field is a clean end of file; EOF
    // anywhere later means the record was torn mid-write.
    let key_size = match rdr.read_u32::<LittleEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(DatafileError::Io(e)),
    };
    let value_size = eof_is_torn(rdr.read_u64::<LittleEndian>())?;
    let checksum = eof_is_torn(rdr.read_u32::<LittleEndian>())?;
    let expiry = eof_is_torn(rdr.read_i64::<LittleEndian>())?;

    check_sizes(key_size, value_size, max_key_size, max_value_size)?;

    let mut key = vec![0u8; key_size as usize];
    eof_is_torn(rdr.read_exact(&mut key))?;
    let mut value = vec![0u8; value_size as usize];
    eof_is_torn(rdr.read_exact(&mut value))?;
    let mut padding = [0u8; V1_PADDING as usize];
    eof_is_torn(rdr.read_exact(&mut padding))?;

    let mut hasher = Crc32::new();
    hasher.update(&value);
    if hasher.finalize() != checksum {
        return Err(DatafileError::Corrupt);
    }

    let n = META_INFO_SIZE + key_size as u64 + value_size + V1_PADDING;
    let entry = Entry {
        key,
        value,
        expiry: (expiry != 0).then_some(expiry),
        checksum,
    };
    Ok(Some((entry, n)))
}

/// Decodes one record from a buffer read at a known offset and size.
///
/// Performs structural validation only; the checksum is carried through
/// untouched so the caller can distinguish a checksum failure from a
/// structurally corrupt record.
pub fn decode(
    buf: &[u8],
    max_key_size: u32,
    max_value_size: u64,
) -> Result<Entry, DatafileError> {
    let mut rdr = buf;
    let key_size = short_is_corrupt(rdr.read_u32::<LittleEndian>())?;
    let value_size = short_is_corrupt(rdr.read_u64::<LittleEndian>())?;
    let checksum = short_is_corrupt(rdr.read_u32::<LittleEndian>())?;
    let expiry = short_is_corrupt(rdr.read_i64::<LittleEndian>())?;

    check_sizes(key_size, value_size, max_key_size, max_value_size)?;
    if (rdr.len() as u64) < key_size as u64 + value_size {
        return Err(DatafileError::Corrupt);
    }

    let mut key = vec![0u8; key_size as usize];
    short_is_corrupt(rdr.read_exact(&mut key))?;
    let mut value = vec![0u8; value_size as usize];
    short_is_corrupt(rdr.read_exact(&mut value))?;

    Ok(Entry {
        key,
        value,
        expiry: (expiry != 0).then_some(expiry),
        checksum,
    })
}

fn check_sizes(
    key_size: u32,
    value_size: u64,
    max_key_size: u32,
    max_value_size: u64,
) -> Result<(), DatafileError> {
    // A zero-length key is never written by the engine.
    if key_size == 0 {
        return Err(DatafileError::Corrupt);
    }
    if max_key_size > 0 && key_size > max_key_size {
        return Err(DatafileError::Corrupt);
    }
    if max_value_size > 0 && value_size > max_value_size {
        return Err(DatafileError::Corrupt);
    }
    // Reject absurd sizes before allocating when the configuration places
    // no bound of its own.
    if max_key_size == 0 && key_size as u64 > MAX_RECORD_SIZE {
        return Err(DatafileError::Corrupt);
    }
    if max_value_size == 0 && value_size > MAX_RECORD_SIZE {
        return Err(DatafileError::Corrupt);
    }
    Ok(())
}

fn eof_is_torn<T>(res: io::Result<T>) -> Result<T, DatafileError> {
    res.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DatafileError::Corrupt
        } else {
            DatafileError::Io(e)
        }
    })
}

fn short_is_corrupt<T>(res: io::Result<T>) -> Result<T, DatafileError> {
    // Reading from a slice only ever fails with UnexpectedEof.
    res.map_err(|_| DatafileError::Corrupt)
}
