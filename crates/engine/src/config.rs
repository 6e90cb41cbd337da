//! Persisted configuration and the open-time option overrides.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::Result;

/// Current on-disk layout version. Databases written by newer versions are
/// rejected at open; older ones are migrated forward.
pub const CURRENT_DB_VERSION: u32 = 1;

fn default_max_datafile_size() -> u64 {
    1 << 20
}

fn default_max_key_size() -> u32 {
    64
}

fn default_max_value_size() -> u64 {
    1 << 16
}

fn default_dir_mode() -> u32 {
    0o700
}

fn default_file_mode() -> u32 {
    0o640
}

/// Database configuration, persisted as JSON at `<path>/config.json`.
///
/// Fields missing from an older config file take their defaults, except
/// `db_version`, which defaults to 0 so pre-versioning databases are
/// recognized and migrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Rotation threshold for the current datafile, in bytes.
    #[serde(default = "default_max_datafile_size")]
    pub max_datafile_size: u64,
    /// Largest accepted key, in bytes. 0 means unlimited.
    #[serde(default = "default_max_key_size")]
    pub max_key_size: u32,
    /// Largest accepted value, in bytes. 0 means unlimited.
    #[serde(default = "default_max_value_size")]
    pub max_value_size: u64,
    /// fsync the current datafile after every put.
    #[serde(default)]
    pub sync: bool,
    /// Truncate a trailing torn record from the last datafile at open.
    #[serde(default)]
    pub auto_recovery: bool,
    /// Permission bits (before umask) for created directories.
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,
    /// Permission bits (before umask) for created files.
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
    /// On-disk layout version of this database.
    #[serde(default)]
    pub db_version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_datafile_size: default_max_datafile_size(),
            max_key_size: default_max_key_size(),
            max_value_size: default_max_value_size(),
            sync: false,
            auto_recovery: false,
            dir_mode: default_dir_mode(),
            file_mode: default_file_mode(),
            db_version: CURRENT_DB_VERSION,
        }
    }
}

impl Config {
    /// Loads a config from `path`.
    pub fn load(path: &Path) -> Result<Config> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    /// Persists the config to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut f = File::create(path)?;
        f.write_all(&serde_json::to_vec_pretty(self)?)?;
        f.sync_all()?;
        Ok(())
    }
}

/// Per-open overrides applied on top of the loaded (or default) [`Config`].
///
/// ```rust,no_run
/// use engine::{Engine, Options};
///
/// let db = Engine::open_with(
///     "/tmp/db",
///     Options::new().max_datafile_size(4 << 20).sync(true),
/// ).unwrap();
/// # drop(db);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Options {
    max_datafile_size: Option<u64>,
    max_key_size: Option<u32>,
    max_value_size: Option<u64>,
    sync: Option<bool>,
    auto_recovery: Option<bool>,
    dir_mode: Option<u32>,
    file_mode: Option<u32>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotation threshold for the current datafile, in bytes.
    #[must_use]
    pub fn max_datafile_size(mut self, bytes: u64) -> Self {
        self.max_datafile_size = Some(bytes);
        self
    }

    /// Largest accepted key in bytes; 0 lifts the limit.
    #[must_use]
    pub fn max_key_size(mut self, bytes: u32) -> Self {
        self.max_key_size = Some(bytes);
        self
    }

    /// Largest accepted value in bytes; 0 lifts the limit.
    #[must_use]
    pub fn max_value_size(mut self, bytes: u64) -> Self {
        self.max_value_size = Some(bytes);
        self
    }

    /// fsync the current datafile after every put.
    #[must_use]
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Truncate a trailing torn record from the last datafile at open.
    #[must_use]
    pub fn auto_recovery(mut self, auto_recovery: bool) -> Self {
        self.auto_recovery = Some(auto_recovery);
        self
    }

    /// Permission bits (before umask) for created directories.
    #[must_use]
    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = Some(mode);
        self
    }

    /// Permission bits (before umask) for created files.
    #[must_use]
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = Some(mode);
        self
    }

    pub(crate) fn apply(&self, cfg: &mut Config) {
        if let Some(v) = self.max_datafile_size {
            cfg.max_datafile_size = v;
        }
        if let Some(v) = self.max_key_size {
            cfg.max_key_size = v;
        }
        if let Some(v) = self.max_value_size {
            cfg.max_value_size = v;
        }
        if let Some(v) = self.sync {
            cfg.sync = v;
        }
        if let Some(v) = self.auto_recovery {
            cfg.auto_recovery = v;
        }
        if let Some(v) = self.dir_mode {
            cfg.dir_mode = v;
        }
        if let Some(v) = self.file_mode {
            cfg.file_mode = v;
        }
    }
}
