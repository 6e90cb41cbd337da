//! # KeyDir — the in-memory key directory
//!
//! An ordered mapping from key bytes to the on-disk location of the key's
//! latest record, plus a parallel ordered mapping from key bytes to expiry
//! timestamps. Both support ordered iteration; the directory additionally
//! supports prefix-filtered iteration, which backs prefix scans.
//!
//! The whole directory lives in memory: every live key has exactly one
//! [`Item`] pointing at a decodable record on disk. The [`persist`] module
//! serializes both maps so a restart can skip replaying the log.

pub mod persist;

pub use persist::IndexError;

use std::collections::BTreeMap;

/// Location of a key's latest record on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    /// Id of the datafile holding the record.
    pub file_id: u64,
    /// Byte offset of the record inside that datafile.
    pub offset: u64,
    /// Encoded size of the record in bytes.
    pub size: u64,
}

/// Ordered map from key to [`Item`] with prefix iteration.
#[derive(Debug, Default)]
pub struct KeyDir {
    map: BTreeMap<Vec<u8>, Item>,
}

impl KeyDir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a binding, returning the displaced item if the key was
    /// already present (the caller accounts its bytes as reclaimable).
    pub fn insert(&mut self, key: Vec<u8>, item: Item) -> Option<Item> {
        self.map.insert(key, item)
    }

    pub fn get(&self, key: &[u8]) -> Option<&Item> {
        self.map.get(key)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Item> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    /// Iterates all bindings in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Item)> {
        self.map.iter()
    }

    /// Iterates the bindings whose key starts with `prefix`, in ascending
    /// key order. An empty prefix visits everything.
    pub fn prefix_iter<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a Item)> + 'a {
        self.map
            .range(prefix.to_vec()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
    }
}

/// Ordered map from key to expiry (Unix nanoseconds UTC).
///
/// A key appears here iff its current record carries an expiry.
#[derive(Debug, Default)]
pub struct TtlIndex {
    map: BTreeMap<Vec<u8>, i64>,
}

impl TtlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Vec<u8>, expiry: i64) -> Option<i64> {
        self.map.insert(key, expiry)
    }

    pub fn get(&self, key: &[u8]) -> Option<&i64> {
        self.map.get(key)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<i64> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    /// Iterates all bindings in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &i64)> {
        self.map.iter()
    }
}

#[cfg(test)]
mod tests;
