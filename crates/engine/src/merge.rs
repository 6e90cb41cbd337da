//! Merge: compacts the datafiles by rewriting the live set into a scratch
//! database and atomically swapping it in.
//!
//! Merge is a small state machine with explicit lock scopes so that puts
//! and gets keep flowing during the bulk copy:
//!
//! 1. **Claim** the merge flag (one merge at a time per instance).
//! 2. **Seal** (short write lock): rotate so the merge set is immutable and
//!    concurrent puts land in a datafile outside it.
//! 3. **Copy** (short read locks, one per key): write every live entry
//!    whose record sits inside the merge set into a scratch database under
//!    the database directory, preserving expiries.
//! 4. **Swap** (single write lock): close this engine's state, delete the
//!    merged-away files, move the scratch datafiles in, and rebuild the
//!    directory by replay. Keys written during the copy survive — their
//!    datafiles are outside the merge set and are left in place.
//!
//! The scratch database's own index and metadata are discarded before the
//! swap: they do not cover the during-merge datafiles, so the post-merge
//! state must come from replay, which covers both.

use log::{debug, info};
use std::fs;
use std::sync::atomic::Ordering;

use crate::{Engine, Error, Result, LOCK_FILE, META_FILE, INDEX_FILE, TTL_INDEX_FILE, MERGE_DIR_PREFIX};

impl Engine {
    /// Rewrites all live entries into a fresh set of datafiles and deletes
    /// the garbage. Reclaimable space drops to zero.
    ///
    /// # Errors
    ///
    /// [`Error::MergeInProgress`] when a merge is already running on this
    /// instance; otherwise any I/O error from the copy or the swap.
    pub fn merge(&self) -> Result<()> {
        if self
            .merging
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::MergeInProgress);
        }
        let res = self.merge_inner();
        self.merging.store(false, Ordering::SeqCst);
        res
    }

    fn merge_inner(&self) -> Result<()> {
        // Phase 1: seal. After this, every datafile with id <= max_merge_id
        // is immutable and concurrent puts go to a file outside the set.
        let max_merge_id = {
            let mut inner = self.inner.write();
            self.rotate_locked(&mut inner)?;
            inner.curr.id() - 1
        };
        debug!("merge started, rewriting datafiles up to id {max_merge_id}");

        // Phase 2: copy the live set into a scratch database. No engine
        // lock is held across the bulk copy; each key takes a short read
        // lock and is re-checked, so deletes and overwrites that race the
        // copy are simply skipped.
        let scratch = tempfile::Builder::new()
            .prefix(MERGE_DIR_PREFIX)
            .tempdir_in(&self.path)?;
        let mdb = Engine::open_with_config(scratch.path(), self.config.clone())?;

        let live_keys: Vec<Vec<u8>> = {
            let inner = self.inner.read();
            inner.keydir.iter().map(|(k, _)| k.clone()).collect()
        };

        for key in live_keys {
            let entry = {
                let inner = self.inner.read();
                match inner.keydir.get(&key) {
                    // deleted since the snapshot
                    None => continue,
                    // rewritten during the merge; the live file keeps it
                    Some(item) if item.file_id > max_merge_id => continue,
                    Some(&item) => {
                        let df = inner.datafiles.get(&item.file_id).ok_or_else(|| {
                            Error::Io(std::io::Error::new(
                                std::io::ErrorKind::NotFound,
                                format!("datafile {} not tracked", item.file_id),
                            ))
                        })?;
                        df.read_at(item.offset, item.size)?
                    }
                }
            };
            if !entry.verify_checksum() {
                return Err(Error::ChecksumFailed);
            }
            mdb.put_nanos(&entry.key, &entry.value, entry.expiry)?;
        }

        mdb.close()?;
        // dropping the handle now keeps its best-effort Drop close from
        // re-writing the checkpoint files removed below
        drop(mdb);

        // The scratch checkpoint must not survive the swap: it does not
        // cover the during-merge datafiles, so the reopen below has to
        // rebuild the directory from the log.
        for name in [INDEX_FILE, TTL_INDEX_FILE, META_FILE] {
            let _ = fs::remove_file(scratch.path().join(name));
        }

        // Phase 3: swap, under one write lock. No reads or writes until
        // the reopen below finishes.
        let mut inner = self.inner.write();
        self.close_locked(&mut inner)?;

        // Drop everything the merge superseded: old datafiles, the stale
        // index checkpoint, and metadata. Keep the lockfile, the scratch
        // directory itself, and datafiles written during the merge.
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let p = entry.path();
            if p.is_dir() {
                continue;
            }
            let name = match p.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_owned(),
                None => continue,
            };
            if name == LOCK_FILE {
                continue;
            }
            if let Some(id) = datafile::parse_id(&name) {
                if id > max_merge_id {
                    continue;
                }
            }
            fs::remove_file(&p)?;
        }

        // Move the merged files in. The scratch lockfile stays behind; the
        // live process still holds its own.
        for entry in fs::read_dir(scratch.path())? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_str() == Some(LOCK_FILE) {
                continue;
            }
            fs::rename(entry.path(), self.path.join(&name))?;
        }

        inner.metadata.reclaimable_space = 0;
        inner.metadata.index_up_to_date = false;
        let metadata = inner.metadata.clone();
        *inner = crate::recovery::build_state(&self.path, &self.config, metadata)?;

        info!(
            "merge complete, {} datafiles tracked, {} live keys",
            inner.datafiles.len(),
            inner.keydir.len()
        );
        Ok(())
    }
}
