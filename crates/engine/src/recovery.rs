//! Cold-start path: datafile enumeration, index loading, log replay, and
//! torn-tail repair.
//!
//! The directory is rebuilt one of three ways, cheapest first:
//!
//! 1. The persisted index exists and metadata says it is up to date —
//!    trust it verbatim.
//! 2. The persisted index exists but is stale — it covers every sealed
//!    datafile up to the last checkpoint, so only the last datafile is
//!    replayed on top of it.
//! 3. No persisted index — replay every datafile in ascending id order.

use datafile::Datafile;
use keydir::{Item, KeyDir, TtlIndex};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::metadata::Metadata;
use crate::{Config, Inner, Result, INDEX_FILE, MERGE_DIR_PREFIX, TTL_INDEX_FILE};

/// Builds a complete in-memory state from what is on disk.
///
/// The largest file id becomes the writable current datafile (id 0 is
/// created fresh for an empty directory); every id, the largest included,
/// also gets a sealed read handle.
pub(crate) fn build_state(path: &Path, config: &Config, metadata: Metadata) -> Result<Inner> {
    let ids = datafile_ids(path)?;
    let last_id = ids.last().copied().unwrap_or(0);

    let mut datafiles = BTreeMap::new();
    for &id in &ids {
        datafiles.insert(
            id,
            Datafile::open(
                path,
                id,
                false,
                config.max_key_size,
                config.max_value_size,
                config.file_mode,
            )?,
        );
    }

    let (keydir, ttl_index) = load_indexes(path, config, &metadata, &mut datafiles, last_id)?;

    let curr = Datafile::open(
        path,
        last_id,
        true,
        config.max_key_size,
        config.max_value_size,
        config.file_mode,
    )?;

    Ok(Inner {
        curr,
        datafiles,
        keydir,
        ttl_index,
        metadata,
    })
}

/// All datafile ids in `path`, ascending.
pub(crate) fn datafile_ids(path: &Path) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if let Some(id) = datafile::parse_id(name) {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

fn load_indexes(
    path: &Path,
    config: &Config,
    metadata: &Metadata,
    datafiles: &mut BTreeMap<u64, Datafile>,
    last_id: u64,
) -> Result<(KeyDir, TtlIndex)> {
    let persisted = keydir::persist::load_keydir(&path.join(INDEX_FILE), config.max_key_size)?;
    let ttl_index = keydir::persist::load_ttl(&path.join(TTL_INDEX_FILE), config.max_key_size)?
        .unwrap_or_default();

    match persisted {
        Some(keydir) if metadata.index_up_to_date => Ok((keydir, ttl_index)),
        Some(mut keydir) => {
            // stale checkpoint: everything newer lives in the last datafile
            let mut ttl_index = ttl_index;
            if let Some(df) = datafiles.get_mut(&last_id) {
                replay_datafile(&mut keydir, &mut ttl_index, df)?;
            }
            Ok((keydir, ttl_index))
        }
        None => {
            let mut keydir = KeyDir::new();
            let mut ttl_index = TtlIndex::new();
            for df in datafiles.values_mut() {
                replay_datafile(&mut keydir, &mut ttl_index, df)?;
            }
            Ok((keydir, ttl_index))
        }
    }
}

/// Replays one datafile into the directory and TTL index. Log order is
/// authoritative: later records overwrite earlier ones, and a tombstone
/// erases the key.
fn replay_datafile(
    keydir: &mut KeyDir,
    ttl_index: &mut TtlIndex,
    df: &mut Datafile,
) -> Result<()> {
    df.rewind();
    let mut offset = 0u64;
    while let Some((entry, n)) = df.read()? {
        if entry.value.is_empty() {
            keydir.remove(&entry.key);
            ttl_index.remove(&entry.key);
        } else {
            keydir.insert(
                entry.key.clone(),
                Item {
                    file_id: df.id(),
                    offset,
                    size: n,
                },
            );
            match entry.expiry {
                Some(at) => {
                    ttl_index.insert(entry.key, at);
                }
                None => {
                    ttl_index.remove(&entry.key);
                }
            }
        }
        offset += n;
    }
    Ok(())
}

/// Scans the last datafile and truncates it at the first torn or corrupt
/// record, so a crash mid-append does not poison replay.
pub(crate) fn check_and_recover(path: &Path, config: &Config) -> Result<()> {
    let ids = datafile_ids(path)?;
    let Some(&last_id) = ids.last() else {
        return Ok(());
    };

    let mut df = Datafile::open(
        path,
        last_id,
        false,
        config.max_key_size,
        config.max_value_size,
        config.file_mode,
    )?;

    let mut valid = 0u64;
    loop {
        match df.read() {
            Ok(Some((_, n))) => valid += n,
            Ok(None) => return Ok(()), // clean tail, nothing to repair
            Err(datafile::DatafileError::Corrupt) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let file_path = path.join(datafile::filename(last_id));
    warn!(
        "truncating torn record in {} at byte {}",
        file_path.display(),
        valid
    );
    let f = OpenOptions::new().write(true).open(&file_path)?;
    f.set_len(valid)?;
    f.sync_all()?;
    Ok(())
}

/// Removes scratch directories left behind by a merge that crashed before
/// its swap completed. Their contents were never part of the live set.
pub(crate) fn sweep_merge_scratch(path: &Path) {
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            let p = entry.path();
            if !p.is_dir() {
                continue;
            }
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                if name.starts_with(MERGE_DIR_PREFIX) {
                    info!("removing leftover merge scratch dir {}", p.display());
                    let _ = fs::remove_dir_all(&p);
                }
            }
        }
    }
}
