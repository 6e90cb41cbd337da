use super::*;
use std::fs;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn item(file_id: u64, offset: u64, size: u64) -> Item {
    Item {
        file_id,
        offset,
        size,
    }
}

fn keydir_with(keys: &[&[u8]]) -> KeyDir {
    let mut dir = KeyDir::new();
    for (i, key) in keys.iter().enumerate() {
        dir.insert(key.to_vec(), item(0, i as u64 * 10, 10));
    }
    dir
}

// -------------------- Directory basics --------------------

#[test]
fn insert_get_remove() {
    let mut dir = KeyDir::new();
    assert!(dir.is_empty());

    assert!(dir.insert(b"k".to_vec(), item(1, 0, 32)).is_none());
    assert_eq!(dir.get(b"k"), Some(&item(1, 0, 32)));
    assert_eq!(dir.len(), 1);

    // overwrite hands back the displaced item
    let old = dir.insert(b"k".to_vec(), item(2, 64, 32));
    assert_eq!(old, Some(item(1, 0, 32)));

    assert_eq!(dir.remove(b"k"), Some(item(2, 64, 32)));
    assert!(dir.get(b"k").is_none());
    assert!(dir.remove(b"k").is_none());
}

#[test]
fn iter_is_key_ordered() {
    let dir = keydir_with(&[b"mango", b"apple", b"banana"]);
    let keys: Vec<&[u8]> = dir.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"apple"[..], b"banana", b"mango"]);
}

// -------------------- Prefix iteration --------------------

#[test]
fn prefix_iter_visits_exactly_the_prefix_in_order() {
    let dir = keydir_with(&[b"ape", b"apple", b"applesauce", b"app", b"aqua", b"banana"]);
    let keys: Vec<&[u8]> = dir.prefix_iter(b"ap").map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"ape"[..], b"app", b"apple", b"applesauce"]);
}

#[test]
fn prefix_iter_stops_at_the_prefix_boundary() {
    // "aq" sorts immediately after every "ap"-prefixed key
    let dir = keydir_with(&[b"ap", b"aq", b"ar"]);
    let keys: Vec<&[u8]> = dir.prefix_iter(b"ap").map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"ap"[..]]);
}

#[test]
fn empty_prefix_visits_everything() {
    let dir = keydir_with(&[b"b", b"a", b"c"]);
    let keys: Vec<&[u8]> = dir.prefix_iter(b"").map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"a"[..], b"b", b"c"]);
}

#[test]
fn prefix_iter_with_no_matches_is_empty() {
    let dir = keydir_with(&[b"apple", b"banana"]);
    assert_eq!(dir.prefix_iter(b"zzz").count(), 0);
}

// -------------------- TTL index --------------------

#[test]
fn ttl_index_basics() {
    let mut ttl = TtlIndex::new();
    assert!(ttl.insert(b"k".to_vec(), 100).is_none());
    assert_eq!(ttl.insert(b"k".to_vec(), 200), Some(100));
    assert_eq!(ttl.get(b"k"), Some(&200));
    assert_eq!(ttl.remove(b"k"), Some(200));
    assert!(ttl.is_empty());
}

#[test]
fn ttl_iter_is_key_ordered() {
    let mut ttl = TtlIndex::new();
    ttl.insert(b"b".to_vec(), 2);
    ttl.insert(b"a".to_vec(), 1);
    ttl.insert(b"c".to_vec(), 3);
    let keys: Vec<&[u8]> = ttl.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"a"[..], b"b", b"c"]);
}

// -------------------- Persistence --------------------

#[test]
fn keydir_save_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");

    let mut kd = KeyDir::new();
    kd.insert(b"alpha".to_vec(), item(0, 0, 40));
    kd.insert(b"beta".to_vec(), item(2, 120, 56));
    persist::save_keydir(&kd, &path).unwrap();

    let loaded = persist::load_keydir(&path, 0).unwrap().expect("index file");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get(b"alpha"), Some(&item(0, 0, 40)));
    assert_eq!(loaded.get(b"beta"), Some(&item(2, 120, 56)));
}

#[test]
fn ttl_save_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ttl_index");

    let mut ttl = TtlIndex::new();
    ttl.insert(b"k1".to_vec(), 1_000);
    ttl.insert(b"k2".to_vec(), -5);
    persist::save_ttl(&ttl, &path).unwrap();

    let loaded = persist::load_ttl(&path, 0).unwrap().expect("ttl file");
    assert_eq!(loaded.get(b"k1"), Some(&1_000));
    assert_eq!(loaded.get(b"k2"), Some(&-5));
}

#[test]
fn load_missing_file_is_none() {
    let dir = tempdir().unwrap();
    assert!(persist::load_keydir(&dir.path().join("index"), 0)
        .unwrap()
        .is_none());
    assert!(persist::load_ttl(&dir.path().join("ttl_index"), 0)
        .unwrap()
        .is_none());
}

#[test]
fn load_empty_maps_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");
    persist::save_keydir(&KeyDir::new(), &path).unwrap();
    let loaded = persist::load_keydir(&path, 0).unwrap().unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn torn_index_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");

    let mut kd = KeyDir::new();
    kd.insert(b"somekey".to_vec(), item(1, 2, 3));
    persist::save_keydir(&kd, &path).unwrap();

    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..data.len() - 4]).unwrap();

    let err = persist::load_keydir(&path, 0).unwrap_err();
    assert!(matches!(err, IndexError::Corrupt));
}

#[test]
fn oversized_key_length_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");

    // key_len = 100 but the configured bound is 8
    let mut data = Vec::new();
    data.extend_from_slice(&100u32.to_le_bytes());
    data.extend_from_slice(&[b'x'; 100]);
    data.extend_from_slice(&[0u8; 24]);
    fs::write(&path, &data).unwrap();

    let err = persist::load_keydir(&path, 8).unwrap_err();
    assert!(matches!(err, IndexError::Corrupt));
}
