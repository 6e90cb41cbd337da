use crate::*;
use anyhow::Result;
use datafile::META_INFO_SIZE;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use tempfile::tempdir;

// --------------------- Prefix scans ---------------------

#[test]
fn scan_visits_exactly_the_prefix_in_order() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;

    for key in [b"banana".as_slice(), b"app", b"applesauce", b"ape", b"apple", b"aqua"] {
        db.put(key, b"v")?;
    }

    let mut visited = Vec::new();
    db.scan(b"ap", |key| {
        visited.push(key.to_vec());
        Ok(())
    })?;

    let expected: Vec<Vec<u8>> = [b"ape".as_slice(), b"app", b"apple", b"applesauce"]
        .iter()
        .map(|k| k.to_vec())
        .collect();
    assert_eq!(visited, expected);
    Ok(())
}

#[test]
fn scan_with_no_matches_visits_nothing() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    db.put(b"apple", b"v")?;

    let mut visited = 0;
    db.scan(b"zzz", |_| {
        visited += 1;
        Ok(())
    })?;
    assert_eq!(visited, 0);
    Ok(())
}

#[test]
fn scan_stops_on_first_callback_error() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    for key in [b"a1".as_slice(), b"a2", b"a3"] {
        db.put(key, b"v")?;
    }

    let mut visited = 0;
    let res = db.scan(b"a", |_| {
        visited += 1;
        if visited == 2 {
            return Err(Error::KeyNotFound); // any error aborts
        }
        Ok(())
    });
    assert!(res.is_err());
    assert_eq!(visited, 2);
    Ok(())
}

// --------------------- Fold / keys / len ---------------------

#[test]
fn fold_visits_every_key_in_order() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    for key in [b"m".as_slice(), b"a", b"z"] {
        db.put(key, b"v")?;
    }

    let mut visited = Vec::new();
    db.fold(|key| {
        visited.push(key.to_vec());
        Ok(())
    })?;
    assert_eq!(visited, vec![b"a".to_vec(), b"m".to_vec(), b"z".to_vec()]);
    Ok(())
}

#[test]
fn keys_returns_ordered_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    db.put(b"b", b"2")?;
    db.put(b"a", b"1")?;

    let keys: Vec<Vec<u8>> = db.keys().collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

    // the snapshot does not hold the engine lock
    db.put(b"c", b"3")?;
    Ok(())
}

#[test]
fn len_counts_live_keys() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    assert!(db.is_empty());

    db.put(b"a", b"1")?;
    db.put(b"b", b"2")?;
    db.put(b"a", b"3")?; // overwrite, not a new key
    assert_eq!(db.len(), 2);

    db.delete(b"a")?;
    assert_eq!(db.len(), 1);
    Ok(())
}

// --------------------- Stats ---------------------

#[test]
fn stats_reports_keys_and_disk_size() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    db.put(b"k", b"v")?;

    let stats = db.stats()?;
    assert_eq!(stats.keys, 1);
    assert!(stats.size > 0);
    Ok(())
}

// --------------------- CRC integrity ---------------------

#[test]
fn corrupted_value_byte_fails_checksum() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;

    db.put(b"key", b"value")?;
    db.sync()?;

    // First record sits at offset 0: header, then key, then value.
    // Flip one value byte behind the engine's back.
    let datafile_path = dir.path().join(datafile::filename(0));
    let mut f = OpenOptions::new().write(true).open(&datafile_path)?;
    f.seek(SeekFrom::Start(META_INFO_SIZE + 3))?;
    f.write_all(&[0xff])?;
    f.sync_all()?;

    assert!(matches!(db.get(b"key"), Err(Error::ChecksumFailed)));
    Ok(())
}

// --------------------- Backup ---------------------

#[test]
fn backup_copies_a_readable_database() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    db.put(b"k", b"v")?;
    db.sync()?;

    let target = tempdir()?;
    let backup_path = target.path().join("backup");
    db.backup(&backup_path)?;
    db.close()?;

    // no lockfile in the copy, and the copy opens on its own
    assert!(!backup_path.join("lock").exists());
    let restored = Engine::open(&backup_path)?;
    assert_eq!(restored.get(b"k")?, b"v");
    Ok(())
}

// --------------------- Debug ---------------------

#[test]
fn debug_output_mentions_state() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    db.put(b"k", b"v")?;

    let dbg = format!("{db:?}");
    assert!(dbg.contains("keys"));
    assert!(dbg.contains("datafiles"));
    Ok(())
}

#[test]
fn reopen_after_manual_file_shuffle() -> Result<()> {
    // removing the persisted index forces a full replay on reopen
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    db.put(b"k", b"v")?;
    db.sync()?;

    let _ = fs::remove_file(dir.path().join("index"));
    let _ = fs::remove_file(dir.path().join("ttl_index"));
    db.reopen()?;
    assert_eq!(db.get(b"k")?, b"v");
    Ok(())
}
