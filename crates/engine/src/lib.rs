//! # Engine — CaskKV storage engine
//!
//! An embedded, log-structured key-value store: every mutation is appended
//! to the current datafile, and an in-memory directory maps each live key
//! to the on-disk location of its latest record. Point lookups cost one
//! positional read; restarts rebuild (or reload) the directory; a
//! caller-initiated merge rewrites the live set and drops the garbage.
//!
//! ## Architecture
//!
//! ```text
//! Caller threads
//!      |
//!      v
//! ┌─────────────────────────────────────────────────┐
//! │                    ENGINE                       │
//! │                                                 │
//! │ write.rs → append to current datafile           │
//! │              |        (size >= threshold?)      │
//! │              |                yes               │
//! │              v                                  │
//! │        rotate: seal + open FileID+1             │
//! │              |                                  │
//! │              v                                  │
//! │        directory + TTL index update             │
//! │                                                 │
//! │ read.rs → directory lookup → read_at → CRC      │
//! │                                                 │
//! │ merge.rs → rewrite live set into scratch dir,   │
//! │            swap datafiles, reopen               │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                |
//! |--------------|--------------------------------------------------------|
//! | [`lib.rs`]   | `Engine` struct, open/close/sync, stats, backup        |
//! | [`write`]    | `put()`, `delete()`, `delete_all()`, `run_gc()`, rotation |
//! | [`read`]     | `get()`, `has()`, `scan()`, `fold()`, `keys()`, `len()` |
//! | [`recovery`] | datafile enumeration, index load, replay, torn-tail repair |
//! | [`merge`]    | compaction into a scratch database + atomic swap       |
//! | [`upgrade`]  | forward on-disk version migrations                     |
//! | [`config`]   | persisted config + open-time `Options`                 |
//! | [`metadata`] | reclaimable-space / index-freshness sidecar            |
//! | [`lock`]     | cross-process lockfile                                 |
//!
//! ## Concurrency
//!
//! One readers-writer lock guards the mutable state. Lookups and scans
//! share the read side; mutations, recovery, and the short phases of merge
//! take the write side. Exactly one process may have the database open,
//! enforced by a lockfile in the database directory.
//!
//! ## Example
//!
//! ```rust,no_run
//! use engine::Engine;
//!
//! let db = Engine::open("/tmp/db").unwrap();
//! db.put(b"hello", b"world").unwrap();
//! assert_eq!(db.get(b"hello").unwrap(), b"world");
//! db.close().unwrap();
//! ```

mod config;
mod error;
mod lock;
mod merge;
mod metadata;
mod read;
mod recovery;
mod upgrade;
mod write;

pub use config::{Config, Options, CURRENT_DB_VERSION};
pub use error::{Error, Result};
pub use write::PutOptions;

use datafile::Datafile;
use keydir::{KeyDir, TtlIndex};
use log::debug;
use metadata::Metadata;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const CONFIG_FILE: &str = "config.json";
pub(crate) const META_FILE: &str = "meta.json";
pub(crate) const LOCK_FILE: &str = "lock";
pub(crate) const INDEX_FILE: &str = "index";
pub(crate) const TTL_INDEX_FILE: &str = "ttl_index";
pub(crate) const TEMP_INDEX_FILE: &str = "temp_index";
pub(crate) const MERGE_DIR_PREFIX: &str = "merge";

/// The mutable state behind the engine's readers-writer lock.
pub(crate) struct Inner {
    /// The single writable datafile.
    pub(crate) curr: Datafile,
    /// Every datafile by id, sealed. Includes a sealed handle for the
    /// current id once it has been rotated or reopened.
    pub(crate) datafiles: BTreeMap<u64, Datafile>,
    pub(crate) keydir: KeyDir,
    pub(crate) ttl_index: TtlIndex,
    pub(crate) metadata: Metadata,
}

/// A CaskKV database handle.
///
/// Methods take `&self`; internal synchronization makes the handle safe to
/// share across threads (e.g. behind an `Arc`).
pub struct Engine {
    path: PathBuf,
    config: Config,
    lock: lock::LockFile,
    inner: RwLock<Inner>,
    merging: AtomicBool,
}

/// Point-in-time counters returned by [`Engine::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Number of sealed datafiles tracked by the engine.
    pub datafiles: usize,
    /// Number of keys in the directory (expired keys included until GC'd).
    pub keys: usize,
    /// Total on-disk size of the database directory in bytes.
    pub size: u64,
}

impl Engine {
    /// Opens (creating if missing) the database at `path` with the
    /// persisted configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Engine> {
        Self::open_with(path, Options::default())
    }

    /// Opens the database at `path`, applying `options` on top of the
    /// persisted (or default) configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::DatabaseLocked`] when another process has it open.
    /// - [`Error::InvalidVersion`] when written by a newer layout version.
    /// - Any I/O, decode, or index error hit during recovery.
    pub fn open_with<P: AsRef<Path>>(path: P, options: Options) -> Result<Engine> {
        let path = path.as_ref();

        let config_path = path.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            Config::load(&config_path)?
        } else {
            Config::default()
        };

        upgrade::check_and_upgrade(path, &mut config)?;
        options.apply(&mut config);

        Self::open_with_config(path, config)
    }

    /// Core open path with a fully resolved configuration. Also used by
    /// merge to open its scratch instance.
    pub(crate) fn open_with_config(path: &Path, config: Config) -> Result<Engine> {
        create_dir_all_with_mode(path, config.dir_mode)?;

        let metadata = Metadata::load(&path.join(META_FILE))?;

        let lock =
            lock::LockFile::try_lock(&path.join(LOCK_FILE))?.ok_or(Error::DatabaseLocked)?;

        config.save(&path.join(CONFIG_FILE))?;

        if config.auto_recovery {
            recovery::check_and_recover(path, &config)?;
        }
        recovery::sweep_merge_scratch(path);

        let inner = recovery::build_state(path, &config, metadata)?;
        debug!(
            "opened database at {} ({} keys, {} datafiles)",
            path.display(),
            inner.keydir.len(),
            inner.datafiles.len()
        );

        Ok(Engine {
            path: path.to_path_buf(),
            config,
            lock,
            inner: RwLock::new(inner),
            merging: AtomicBool::new(false),
        })
    }

    /// The database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The effective configuration this handle runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discards the in-memory state and rebuilds it from disk.
    pub fn reopen(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let metadata = inner.metadata.clone();
        *inner = recovery::build_state(&self.path, &self.config, metadata)?;
        Ok(())
    }

    /// Persists the indexes and metadata, syncs every datafile, and
    /// releases the process lock.
    ///
    /// The lock is released even when persisting fails, so another process
    /// can always take over. The handle should not be used afterwards;
    /// dropping it performs the same close best-effort.
    pub fn close(&self) -> Result<()> {
        let res = {
            let mut inner = self.inner.write();
            self.close_locked(&mut inner)
        };
        let unlock_res = self.lock.unlock();
        res?;
        unlock_res?;
        Ok(())
    }

    /// Inner close: everything except releasing the process lock (merge
    /// closes and reopens while keeping the lock held).
    pub(crate) fn close_locked(&self, inner: &mut Inner) -> Result<()> {
        self.save_indexes(inner)?;
        inner.metadata.index_up_to_date = true;
        inner.metadata.save(&self.path.join(META_FILE))?;
        for df in inner.datafiles.values() {
            df.close()?;
        }
        inner.curr.close()?;
        Ok(())
    }

    /// Persists metadata and syncs the current datafile.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.read();
        inner.metadata.save(&self.path.join(META_FILE))?;
        inner.curr.sync()?;
        Ok(())
    }

    /// Writes both indexes to disk via a temp file + rename, so a crash
    /// never leaves a half-written index behind.
    pub(crate) fn save_indexes(&self, inner: &Inner) -> Result<()> {
        let temp = self.path.join(TEMP_INDEX_FILE);
        keydir::persist::save_keydir(&inner.keydir, &temp)?;
        fs::rename(&temp, self.path.join(INDEX_FILE))?;
        keydir::persist::save_ttl(&inner.ttl_index, &temp)?;
        fs::rename(&temp, self.path.join(TTL_INDEX_FILE))?;
        Ok(())
    }

    /// Bytes a merge would reclaim (superseded and tombstoned records).
    #[must_use]
    pub fn reclaimable(&self) -> u64 {
        self.inner.read().metadata.reclaimable_space
    }

    /// Counts of datafiles and keys plus the on-disk size of the database.
    pub fn stats(&self) -> Result<Stats> {
        let size = dir_size(&self.path)?;
        let inner = self.inner.read();
        Ok(Stats {
            datafiles: inner.datafiles.len(),
            keys: inner.keydir.len(),
            size,
        })
    }

    /// Copies the database directory to `target` (created if missing),
    /// excluding the lockfile.
    pub fn backup<P: AsRef<Path>>(&self, target: P) -> Result<()> {
        let target = target.as_ref();
        create_dir_all_with_mode(target, self.config.dir_mode)?;
        let _inner = self.inner.read();
        copy_dir(&self.path, target)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Engine")
            .field("path", &self.path)
            .field("keys", &inner.keydir.len())
            .field("datafiles", &inner.datafiles.len())
            .field("current_id", &inner.curr.id())
            .field("reclaimable_space", &inner.metadata.reclaimable_space)
            .finish()
    }
}

/// Best-effort close on drop.
///
/// Persists the indexes and releases the process lock when the handle goes
/// out of scope without an explicit [`Engine::close`]. Errors cannot
/// propagate out of `Drop`; the datafiles themselves are already durable,
/// so the worst case is a replay on the next open.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Converts a wall-clock instant to the expiry representation (Unix
/// nanoseconds). Pre-epoch instants collapse to an already-expired value;
/// zero is reserved for "no expiry".
pub(crate) fn expiry_nanos(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(1)
}

pub(crate) fn now_nanos() -> i64 {
    expiry_nanos(SystemTime::now())
}

#[cfg(unix)]
fn create_dir_all_with_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if path.exists() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dir_all_with_mode(path: &Path, _mode: u32) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path)
}

/// Recursive byte size of a directory.
fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Recursive directory copy, skipping lockfiles.
fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str() == Some(LOCK_FILE) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&to)?;
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
