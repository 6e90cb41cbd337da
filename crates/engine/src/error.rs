//! Unified error type for engine operations.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Every way an engine operation can fail.
///
/// Validation errors (`EmptyKey`, `KeyTooLarge`, `ValueTooLarge`) are
/// reported before anything is written and leave the store unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// The key is not present in the directory.
    #[error("error: key not found")]
    KeyNotFound,

    /// The key exists but its expiry has passed.
    #[error("error: key expired")]
    KeyExpired,

    /// The key exceeds the configured `max_key_size`.
    #[error("error: key too large")]
    KeyTooLarge,

    /// Keys must be non-empty.
    #[error("error: empty key")]
    EmptyKey,

    /// The value exceeds the configured `max_value_size`.
    #[error("error: value too large")]
    ValueTooLarge,

    /// A value read from disk did not match its stored CRC.
    #[error("error: checksum failed")]
    ChecksumFailed,

    /// Another process holds the database lock.
    #[error("error: database locked")]
    DatabaseLocked,

    /// The on-disk version is newer than this build understands.
    #[error("error: invalid db version")]
    InvalidVersion,

    /// A merge is already running on this instance.
    #[error("error: merge already in progress")]
    MergeInProgress,

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A datafile-level failure (corrupt record, sealed write, ...).
    #[error(transparent)]
    Datafile(#[from] datafile::DatafileError),

    /// A persisted-index failure.
    #[error(transparent)]
    Index(#[from] keydir::IndexError),

    /// Config or metadata (de)serialization failure.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}
