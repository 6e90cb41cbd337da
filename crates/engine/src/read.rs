//! Read path: `get()`, `has()`, `scan()`, `fold()`, `keys()`, `len()`.
//!
//! Lookups resolve through the in-memory directory to a single positional
//! read: current datafile when the file id matches, sealed datafile
//! otherwise. The stored CRC is verified against the value before it is
//! handed out.

use keydir::{Item, TtlIndex};

use crate::{now_nanos, Engine, Error, Inner, Result};

impl Engine {
    /// Fetches the value for `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::KeyNotFound`] when the key has no live record.
    /// - [`Error::KeyExpired`] when its expiry has passed; the key is
    ///   deleted best-effort as a side effect.
    /// - [`Error::ChecksumFailed`] when the stored value fails CRC
    ///   verification.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        {
            let inner = self.inner.read();
            match inner.keydir.get(key) {
                None => return Err(Error::KeyNotFound),
                Some(&item) if !is_expired(&inner.ttl_index, key) => {
                    return self.read_item(&inner, item);
                }
                Some(_) => {}
            }
        }

        // The key has expired. Promote to the write lock so the dead entry
        // can be removed, re-checking since the locks were swapped.
        let mut inner = self.inner.write();
        match inner.keydir.get(key) {
            None => Err(Error::KeyNotFound),
            Some(&item) if !is_expired(&inner.ttl_index, key) => self.read_item(&inner, item),
            Some(_) => {
                // best-effort: the expired record is garbage either way
                let _ = self.delete_locked(&mut inner, key);
                Err(Error::KeyExpired)
            }
        }
    }

    /// True when `key` has a live, unexpired record.
    #[must_use]
    pub fn has(&self, key: &[u8]) -> bool {
        let inner = self.inner.read();
        inner.keydir.get(key).is_some() && !is_expired(&inner.ttl_index, key)
    }

    /// Visits every key with the given prefix in ascending key order.
    ///
    /// Iteration stops at the first callback error, which is returned. The
    /// callback runs under the engine's read lock and must not call back
    /// into the engine.
    pub fn scan<F>(&self, prefix: &[u8], mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let inner = self.inner.read();
        for (key, _) in inner.keydir.prefix_iter(prefix) {
            f(key)?;
        }
        Ok(())
    }

    /// Visits every key in ascending key order. Same callback contract as
    /// [`scan`](Engine::scan).
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let inner = self.inner.read();
        for (key, _) in inner.keydir.iter() {
            f(key)?;
        }
        Ok(())
    }

    /// Returns the non-expired keys in ascending key order.
    ///
    /// The snapshot is taken under the read lock and released before this
    /// returns, so consumers can drain at leisure without blocking writers.
    pub fn keys(&self) -> impl Iterator<Item = Vec<u8>> {
        let inner = self.inner.read();
        let now = now_nanos();
        let keys: Vec<Vec<u8>> = inner
            .keydir
            .iter()
            .filter(|(key, _)| match inner.ttl_index.get(key) {
                Some(&at) => at > now,
                None => true,
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.into_iter()
    }

    /// Number of keys in the directory. Expired keys count until a `get`
    /// or [`run_gc`](Engine::run_gc) removes them.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().keydir.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves an item to its value: select the datafile by id, read at
    /// the recorded offset, verify the CRC.
    fn read_item(&self, inner: &Inner, item: Item) -> Result<Vec<u8>> {
        let entry = if item.file_id == inner.curr.id() {
            inner.curr.read_at(item.offset, item.size)?
        } else {
            let df = inner.datafiles.get(&item.file_id).ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("datafile {} not tracked", item.file_id),
                ))
            })?;
            df.read_at(item.offset, item.size)?
        };

        if !entry.verify_checksum() {
            return Err(Error::ChecksumFailed);
        }
        Ok(entry.value)
    }
}

/// True when the key is in the TTL index and its expiry has passed. A key
/// with no TTL entry never expires.
pub(crate) fn is_expired(ttl: &TtlIndex, key: &[u8]) -> bool {
    match ttl.get(key) {
        Some(&at) => at <= now_nanos(),
        None => false,
    }
}
