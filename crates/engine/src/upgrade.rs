//! Forward on-disk version migrations.
//!
//! Version 0 records lack the 8 reserved trailing bytes that version 1
//! appends after every record. The v0→v1 migration rewrites each datafile
//! with the padding inserted, via a sibling temp file and rename, so a
//! crash mid-migration leaves every datafile in exactly one of the two
//! layouts.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use datafile::V1_PADDING;
use log::warn;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::{recovery, Config, Error, Result, CURRENT_DB_VERSION};

/// Rejects databases from the future and migrates old ones forward.
/// The bumped `db_version` is persisted later in the open sequence.
pub(crate) fn check_and_upgrade(path: &Path, config: &mut Config) -> Result<()> {
    if config.db_version == CURRENT_DB_VERSION {
        return Ok(());
    }
    if config.db_version > CURRENT_DB_VERSION {
        return Err(Error::InvalidVersion);
    }

    warn!(
        "upgrading database at {} from version {} to {}, this may take a while",
        path.display(),
        config.db_version,
        CURRENT_DB_VERSION
    );
    if config.db_version == 0 {
        apply_v0_to_v1(path)?;
    }
    config.db_version = CURRENT_DB_VERSION;
    Ok(())
}

fn apply_v0_to_v1(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for id in recovery::datafile_ids(path)? {
        rewrite_v0_datafile(&path.join(datafile::filename(id)))?;
    }
    // every record offset just shifted, so a pre-migration checkpoint
    // would resolve to the wrong records; force a replay instead
    for name in [crate::INDEX_FILE, crate::TTL_INDEX_FILE, crate::META_FILE] {
        let _ = fs::remove_file(path.join(name));
    }
    Ok(())
}

/// Rewrites one v0 datafile, appending the reserved bytes after every
/// record. Offsets shift, so any persisted index is stale afterwards; the
/// caller's open path replays as needed.
fn rewrite_v0_datafile(file_path: &Path) -> Result<()> {
    let tmp_path = file_path.with_extension("data.tmp");
    {
        let mut rdr = BufReader::new(File::open(file_path)?);
        let mut w = BufWriter::new(File::create(&tmp_path)?);

        loop {
            // v0 header: same four fields, no trailing padding
            let key_size = match rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let value_size = rdr.read_u64::<LittleEndian>()?;
            let checksum = rdr.read_u32::<LittleEndian>()?;
            let expiry = rdr.read_i64::<LittleEndian>()?;

            w.write_u32::<LittleEndian>(key_size)?;
            w.write_u64::<LittleEndian>(value_size)?;
            w.write_u32::<LittleEndian>(checksum)?;
            w.write_i64::<LittleEndian>(expiry)?;

            let mut payload = vec![0u8; key_size as usize + value_size as usize];
            rdr.read_exact(&mut payload)?;
            w.write_all(&payload)?;
            w.write_all(&[0u8; V1_PADDING as usize])?;
        }

        w.flush()?;
        w.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, file_path)?;
    Ok(())
}
