//! # Datafile — append-only record storage
//!
//! A datafile is an append-only file of encoded records, identified by a
//! non-negative integer id that also names the file on disk (`{:09}.data`).
//! A database owns exactly one **writable** datafile at a time; every other
//! datafile is **sealed** (read-only) and immutable until a merge discards
//! it.
//!
//! ## Access paths
//!
//! - [`Datafile::write`] appends one encoded record and reports where it
//!   landed, so the caller can index it by `(id, offset, size)`.
//! - [`Datafile::read_at`] decodes the record at a known offset through a
//!   shared `&self` reference (positional reads, no seeking), which is what
//!   point lookups use.
//! - [`Datafile::read`] advances a sequential cursor over the whole file,
//!   which is what recovery replay uses.
//!
//! See [`codec`] for the on-disk record format.
//!
//! ## Example
//!
//! ```rust,no_run
//! use datafile::{Datafile, Entry};
//! use std::path::Path;
//!
//! let mut df = Datafile::open(Path::new("db"), 0, true, 0, 0, 0o640).unwrap();
//! let (offset, n) = df.write(&Entry::new(b"hello".to_vec(), b"world".to_vec(), None)).unwrap();
//! let entry = df.read_at(offset, n).unwrap();
//! assert_eq!(entry.value, b"world");
//! ```

pub mod codec;

pub use codec::{Entry, META_INFO_SIZE, V1_PADDING};

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while reading or writing a datafile.
#[derive(Debug, Error)]
pub enum DatafileError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed structural validation, was torn mid-write, or failed
    /// CRC verification during a streaming read.
    #[error("corrupt record")]
    Corrupt,

    /// A write was attempted on a sealed (read-only) datafile.
    #[error("write on sealed datafile")]
    Sealed,
}

/// Returns the on-disk file name for a datafile id.
///
/// Ids are zero-padded so lexicographic directory order matches numeric
/// order.
pub fn filename(id: u64) -> String {
    format!("{id:09}.data")
}

/// Parses a datafile id back out of a file name. Returns `None` for
/// anything that is not a datafile.
pub fn parse_id(name: &str) -> Option<u64> {
    name.strip_suffix(".data")?.parse().ok()
}

/// One append-only datafile, either writable or sealed.
pub struct Datafile {
    id: u64,
    path: PathBuf,
    /// Append handle; `Some` iff the datafile is writable.
    writer: Option<File>,
    /// Read-only handle used for positional reads through `&self`.
    reader: File,
    /// Byte position of the sequential cursor used by [`read`](Self::read).
    read_pos: u64,
    size: u64,
    max_key_size: u32,
    max_value_size: u64,
    /// Reusable scratch buffer so appends encode without allocating.
    buf: Vec<u8>,
}

impl Datafile {
    /// Opens the datafile `id` inside `dir`.
    ///
    /// A writable open creates the file if it does not exist (with
    /// `file_mode` permission bits before umask on Unix); a sealed open
    /// requires it to exist. `max_key_size` / `max_value_size` bound record
    /// decoding; zero means unbounded.
    pub fn open(
        dir: &Path,
        id: u64,
        writable: bool,
        max_key_size: u32,
        max_value_size: u64,
        file_mode: u32,
    ) -> Result<Self, DatafileError> {
        let path = dir.join(filename(id));

        let writer = if writable {
            let mut opts = OpenOptions::new();
            opts.create(true).append(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                opts.mode(file_mode);
            }
            #[cfg(not(unix))]
            let _ = file_mode;
            Some(opts.open(&path)?)
        } else {
            None
        };

        let reader = File::open(&path)?;
        let size = reader.metadata()?.len();

        Ok(Self {
            id,
            path,
            writer,
            reader,
            read_pos: 0,
            size,
            max_key_size,
            max_value_size,
            buf: Vec::with_capacity(256),
        })
    }

    /// The datafile id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current size of the file in bytes (tracked, not stat'ed).
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, returning `(offset, n_written)` where `offset`
    /// is the file position before the write.
    ///
    /// After a successful write, `read_at(offset, n_written)` returns the
    /// same entry after any number of further appends. Fails with
    /// [`DatafileError::Sealed`] on a read-only datafile. Durability
    /// requires [`sync`](Self::sync).
    pub fn write(&mut self, entry: &Entry) -> Result<(u64, u64), DatafileError> {
        let writer = self.writer.as_mut().ok_or(DatafileError::Sealed)?;

        // Encode into the scratch buffer and issue a single write call for
        // the whole frame.
        self.buf.clear();
        let n = codec::encode(entry, &mut self.buf);
        writer.write_all(&self.buf)?;

        let offset = self.size;
        self.size += n;
        Ok((offset, n))
    }

    /// Decodes the record stored at `offset` spanning `size` bytes.
    ///
    /// The stored checksum is **not** verified here; callers compare it
    /// against the value so they can report a checksum failure distinctly
    /// from structural corruption.
    pub fn read_at(&self, offset: u64, size: u64) -> Result<Entry, DatafileError> {
        let mut buf = vec![0u8; size as usize];
        read_exact_at(&self.reader, &mut buf, offset)?;
        codec::decode(&buf, self.max_key_size, self.max_value_size)
    }

    /// Reads the next record at the sequential cursor, verifying its CRC.
    /// Returns `Ok(None)` at a clean end of file.
    pub fn read(&mut self) -> Result<Option<(Entry, u64)>, DatafileError> {
        let mut rdr = PosReader {
            file: &self.reader,
            pos: self.read_pos,
        };
        match codec::decode_stream(&mut rdr, self.max_key_size, self.max_value_size)? {
            Some((entry, n)) => {
                self.read_pos += n;
                Ok(Some((entry, n)))
            }
            None => Ok(None),
        }
    }

    /// Resets the sequential cursor back to the start of the file.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// Flushes file contents and metadata to stable storage.
    pub fn sync(&self) -> io::Result<()> {
        match &self.writer {
            Some(w) => w.sync_all(),
            None => Ok(()),
        }
    }

    /// Syncs any pending writes. The file descriptors are released when the
    /// value is dropped.
    pub fn close(&self) -> io::Result<()> {
        self.sync()
    }
}

impl std::fmt::Debug for Datafile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datafile")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("writable", &self.writer.is_some())
            .field("size", &self.size)
            .finish()
    }
}

/// Positional `Read` adapter over a shared file handle. Reads never move
/// the handle's own offset, so concurrent `read_at` calls stay safe.
struct PosReader<'a> {
    file: &'a File,
    pos: u64,
}

impl Read for PosReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_at(self.file, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match read_at(file, buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
