//! Cross-process exclusion via a filesystem lock.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// An exclusively locked file. Only one process can hold the lock for a
/// given database directory; the lock outlives everything the engine does
/// until [`unlock`](LockFile::unlock) (or process exit) releases it.
pub(crate) struct LockFile {
    file: File,
}

impl LockFile {
    /// Creates the lock file if needed and tries to lock it without
    /// blocking. Returns `Ok(None)` when another process holds the lock.
    pub(crate) fn try_lock(path: &Path) -> io::Result<Option<LockFile>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(LockFile { file })),
            Err(_) => Ok(None),
        }
    }

    /// Releases the lock. Unlocking an already-released lock is a no-op.
    pub(crate) fn unlock(&self) -> io::Result<()> {
        FileExt::unlock(&self.file)
    }
}
