//! On-disk persistence for the key directory and the TTL index.
//!
//! Both files are flat sequences of length-prefixed records, little-endian:
//!
//! ```text
//! directory:  [key_len: u32][key][file_id: u64][offset: u64][size: u64] ...
//! ttl index:  [key_len: u32][key][expiry: i64] ...
//! ```
//!
//! Saving writes and fsyncs the given path; renaming a temp file into place
//! for atomicity is the caller's job. Loading returns `Ok(None)` when the
//! file does not exist and [`IndexError::Corrupt`] when it is torn or
//! carries an out-of-bounds key length — the caller decides whether to
//! rebuild from the log.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::{Item, KeyDir, TtlIndex};

/// Cap on key lengths accepted from an index file when the configuration
/// places no bound of its own. Stops a corrupt length prefix from
/// allocating the moon.
const MAX_KEY_BYTES: u32 = 64 * 1024 * 1024;

/// Errors from saving or loading a persisted index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The index file is torn or structurally invalid.
    #[error("corrupt index file")]
    Corrupt,
}

/// Writes the directory to `path` and fsyncs it.
pub fn save_keydir(dir: &KeyDir, path: &Path) -> Result<(), IndexError> {
    let mut w = BufWriter::new(File::create(path)?);
    for (key, item) in dir.iter() {
        w.write_u32::<LittleEndian>(key.len() as u32)?;
        w.write_all(key)?;
        w.write_u64::<LittleEndian>(item.file_id)?;
        w.write_u64::<LittleEndian>(item.offset)?;
        w.write_u64::<LittleEndian>(item.size)?;
    }
    w.flush()?;
    w.get_ref().sync_all()?;
    Ok(())
}

/// Reads a directory back from `path`. `Ok(None)` when the file is absent.
pub fn load_keydir(path: &Path, max_key_size: u32) -> Result<Option<KeyDir>, IndexError> {
    let mut rdr = match open_reader(path)? {
        Some(r) => r,
        None => return Ok(None),
    };

    let mut dir = KeyDir::new();
    while let Some(key) = read_key(&mut rdr, max_key_size)? {
        let file_id = eof_is_corrupt(rdr.read_u64::<LittleEndian>())?;
        let offset = eof_is_corrupt(rdr.read_u64::<LittleEndian>())?;
        let size = eof_is_corrupt(rdr.read_u64::<LittleEndian>())?;
        dir.insert(
            key,
            Item {
                file_id,
                offset,
                size,
            },
        );
    }
    Ok(Some(dir))
}

/// Writes the TTL index to `path` and fsyncs it.
pub fn save_ttl(ttl: &TtlIndex, path: &Path) -> Result<(), IndexError> {
    let mut w = BufWriter::new(File::create(path)?);
    for (key, expiry) in ttl.iter() {
        w.write_u32::<LittleEndian>(key.len() as u32)?;
        w.write_all(key)?;
        w.write_i64::<LittleEndian>(*expiry)?;
    }
    w.flush()?;
    w.get_ref().sync_all()?;
    Ok(())
}

/// Reads a TTL index back from `path`. `Ok(None)` when the file is absent.
pub fn load_ttl(path: &Path, max_key_size: u32) -> Result<Option<TtlIndex>, IndexError> {
    let mut rdr = match open_reader(path)? {
        Some(r) => r,
        None => return Ok(None),
    };

    let mut ttl = TtlIndex::new();
    while let Some(key) = read_key(&mut rdr, max_key_size)? {
        let expiry = eof_is_corrupt(rdr.read_i64::<LittleEndian>())?;
        ttl.insert(key, expiry);
    }
    Ok(Some(ttl))
}

fn open_reader(path: &Path) -> Result<Option<BufReader<File>>, IndexError> {
    match File::open(path) {
        Ok(f) => Ok(Some(BufReader::new(f))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reads the next length-prefixed key, `None` at a clean end of file.
fn read_key<R: Read>(rdr: &mut R, max_key_size: u32) -> Result<Option<Vec<u8>>, IndexError> {
    let key_len = match rdr.read_u32::<LittleEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let cap = if max_key_size > 0 {
        max_key_size
    } else {
        MAX_KEY_BYTES
    };
    if key_len == 0 || key_len > cap {
        return Err(IndexError::Corrupt);
    }

    let mut key = vec![0u8; key_len as usize];
    eof_is_corrupt(rdr.read_exact(&mut key))?;
    Ok(Some(key))
}

fn eof_is_corrupt<T>(res: io::Result<T>) -> Result<T, IndexError> {
    res.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            IndexError::Corrupt
        } else {
            IndexError::Io(e)
        }
    })
}
