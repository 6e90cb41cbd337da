//! Write path: `put()`, `delete()`, `delete_all()`, `run_gc()`, and
//! datafile rotation.
//!
//! All mutations append a record to the current datafile first, then update
//! the in-memory directory and TTL index. When the current datafile reaches
//! `max_datafile_size` it is sealed and a fresh one opened at the next id;
//! both indexes are checkpointed at that boundary so recovery only ever has
//! to replay the last datafile.

use datafile::{Datafile, Entry, META_INFO_SIZE};
use keydir::Item;
use std::time::SystemTime;

use crate::{expiry_nanos, now_nanos, Engine, Error, Inner, Result};

/// Per-put options. Currently the only feature is an expiry.
///
/// ```rust,no_run
/// use engine::{Engine, PutOptions};
/// use std::time::{Duration, SystemTime};
///
/// let db = Engine::open("/tmp/db").unwrap();
/// db.put_with(
///     b"session",
///     b"token",
///     PutOptions::new().expiry(SystemTime::now() + Duration::from_secs(60)),
/// ).unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PutOptions {
    expiry: Option<SystemTime>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an absolute expiry; the key stops resolving once it passes.
    #[must_use]
    pub fn expiry(mut self, at: SystemTime) -> Self {
        self.expiry = Some(at);
        self
    }
}

impl Engine {
    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, PutOptions::new())
    }

    /// Stores `value` under `key` with per-put options.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyKey`], [`Error::KeyTooLarge`], or
    /// [`Error::ValueTooLarge`] when validation fails (nothing is written),
    /// otherwise any I/O error from the append or rotation.
    pub fn put_with(&self, key: &[u8], value: &[u8], options: PutOptions) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if self.config.max_key_size > 0 && key.len() as u64 > self.config.max_key_size as u64 {
            return Err(Error::KeyTooLarge);
        }
        if self.config.max_value_size > 0 && value.len() as u64 > self.config.max_value_size {
            return Err(Error::ValueTooLarge);
        }
        let expiry = options.expiry.map(expiry_nanos);

        let mut inner = self.inner.write();
        self.put_locked(&mut inner, key, value, expiry)
    }

    /// Internal put used by merge to carry an already-decoded expiry over.
    pub(crate) fn put_nanos(&self, key: &[u8], value: &[u8], expiry: Option<i64>) -> Result<()> {
        let mut inner = self.inner.write();
        self.put_locked(&mut inner, key, value, expiry)
    }

    pub(crate) fn put_locked(
        &self,
        inner: &mut Inner,
        key: &[u8],
        value: &[u8],
        expiry: Option<i64>,
    ) -> Result<()> {
        let (offset, n) = self.append_locked(inner, key, value, expiry)?;

        if self.config.sync {
            inner.curr.sync()?;
        }

        // any successful mutation invalidates the persisted index
        inner.metadata.index_up_to_date = false;

        let item = Item {
            file_id: inner.curr.id(),
            offset,
            size: n,
        };
        if let Some(old) = inner.keydir.insert(key.to_vec(), item) {
            inner.metadata.reclaimable_space += old.size;
        }

        match expiry {
            Some(at) => {
                inner.ttl_index.insert(key.to_vec(), at);
            }
            None => {
                // An expiry does not stick across overwrites: the new
                // record has none, so neither may the TTL index.
                inner.ttl_index.remove(key);
            }
        }

        Ok(())
    }

    /// Deletes `key` by appending a tombstone.
    ///
    /// Deleting a key that does not exist still appends a tombstone and
    /// succeeds.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        self.delete_locked(&mut inner, key)
    }

    pub(crate) fn delete_locked(&self, inner: &mut Inner, key: &[u8]) -> Result<()> {
        // tombstone = empty value; skips put validation on purpose
        self.append_locked(inner, key, &[], None)?;
        inner.metadata.index_up_to_date = false;

        if let Some(old) = inner.keydir.remove(key) {
            // the dead record plus the tombstone that killed it
            inner.metadata.reclaimable_space += old.size + META_INFO_SIZE + key.len() as u64;
        }
        inner.ttl_index.remove(key);
        Ok(())
    }

    /// Deletes every key in the database.
    pub fn delete_all(&self) -> Result<()> {
        let mut inner = self.inner.write();

        let keys: Vec<Vec<u8>> = inner.keydir.iter().map(|(k, _)| k.clone()).collect();
        for key in &keys {
            self.append_locked(&mut inner, key, &[], None)?;
            if let Some(&item) = inner.keydir.get(key) {
                inner.metadata.reclaimable_space +=
                    item.size + META_INFO_SIZE + key.len() as u64;
            }
        }

        inner.metadata.index_up_to_date = false;
        inner.keydir.clear();
        inner.ttl_index.clear();
        Ok(())
    }

    /// Deletes every key whose expiry has passed, in key order.
    pub fn run_gc(&self) -> Result<()> {
        let mut inner = self.inner.write();

        let now = now_nanos();
        let expired: Vec<Vec<u8>> = inner
            .ttl_index
            .iter()
            .filter(|(_, &at)| at <= now)
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired {
            self.delete_locked(&mut inner, &key)?;
        }
        Ok(())
    }

    /// Appends one record, rotating the current datafile first when it has
    /// reached the configured size threshold.
    fn append_locked(
        &self,
        inner: &mut Inner,
        key: &[u8],
        value: &[u8],
        expiry: Option<i64>,
    ) -> Result<(u64, u64)> {
        if inner.curr.size() >= self.config.max_datafile_size {
            self.rotate_locked(inner)?;
        }
        let entry = Entry::new(key.to_vec(), value.to_vec(), expiry);
        Ok(inner.curr.write(&entry)?)
    }

    /// Seals the current datafile and opens a writable one at the next id.
    /// Both indexes are checkpointed so a crash after this point only needs
    /// the new (empty) datafile replayed.
    pub(crate) fn rotate_locked(&self, inner: &mut Inner) -> Result<()> {
        inner.curr.close()?;
        let id = inner.curr.id();

        let sealed = Datafile::open(
            &self.path,
            id,
            false,
            self.config.max_key_size,
            self.config.max_value_size,
            self.config.file_mode,
        )?;
        inner.datafiles.insert(id, sealed);

        inner.curr = Datafile::open(
            &self.path,
            id + 1,
            true,
            self.config.max_key_size,
            self.config.max_value_size,
            self.config.file_mode,
        )?;

        self.save_indexes(inner)?;
        Ok(())
    }
}
