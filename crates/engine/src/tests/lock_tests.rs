use crate::*;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn second_open_of_a_locked_database_fails_fast() -> Result<()> {
    let dir = tempdir()?;
    let db1 = Engine::open(dir.path())?;
    db1.put(b"k", b"v")?;

    assert!(matches!(
        Engine::open(dir.path()),
        Err(Error::DatabaseLocked)
    ));

    db1.close()?;
    let db2 = Engine::open(dir.path())?;
    assert_eq!(db2.get(b"k")?, b"v");
    Ok(())
}

#[test]
fn dropping_the_handle_releases_the_lock() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = Engine::open(dir.path())?;
        db.put(b"k", b"v")?;
        // no explicit close; Drop must release the lock
    }

    let db = Engine::open(dir.path())?;
    assert_eq!(db.get(b"k")?, b"v");
    Ok(())
}

#[test]
fn lockfile_exists_while_open() -> Result<()> {
    let dir = tempdir()?;
    let db = Engine::open(dir.path())?;
    assert!(dir.path().join("lock").exists());
    drop(db);
    Ok(())
}
