//! Small persisted metadata sidecar (`meta.json`).

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crate::Result;

/// Bookkeeping persisted alongside the datafiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Bytes attributable to superseded or tombstoned records; what a merge
    /// would reclaim.
    #[serde(default)]
    pub reclaimable_space: u64,
    /// True only when the persisted index exactly matches the datafiles
    /// (set on a clean close, cleared by the first mutation after).
    #[serde(default)]
    pub index_up_to_date: bool,
}

impl Metadata {
    /// Loads metadata from `path`, or returns the empty default when the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Metadata> {
        match fs::read(path) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Metadata::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists the metadata atomically: write a sibling temp file, fsync,
    /// rename into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&serde_json::to_vec_pretty(self)?)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
