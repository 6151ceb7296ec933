//! On-disk behaviour: reopen, locking, mapped views and torn commits.

use hashdb_core::{Config, CoreError, Database, StoreMode};
use hashdb_storage::InMemoryBackend;
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

fn config() -> Config {
    Config::new().block_size(512).cache_size(4)
}

fn entries(n: u32) -> BTreeMap<Vec<u8>, Vec<u8>> {
    (0..n)
        .map(|i| {
            (
                format!("user:{i:05}").into_bytes(),
                format!("payload-{i}-{}", "x".repeat((i % 40) as usize)).into_bytes(),
            )
        })
        .collect()
}

#[test]
fn reopen_sees_committed_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.hdb");
    let data = entries(1500);

    {
        let mut db = Database::open_with_config(&path, config()).unwrap();
        for (key, value) in &data {
            db.store(key, value, StoreMode::Insert).unwrap();
        }
        assert!(db.delete(b"user:00007").unwrap());
        db.close().unwrap();
    }

    let mut db = Database::open_with_config(&path, config()).unwrap();
    let stats = db.stats().unwrap();
    assert!(stats.dir_bits > 6);
    assert!(stats.buckets > 64);

    for (key, value) in &data {
        let expected = (key.as_slice() != b"user:00007").then_some(value.clone());
        assert_eq!(db.fetch(key).unwrap(), expected);
    }
    assert_eq!(db.keys().unwrap().len(), data.len() - 1);
}

#[test]
fn dropped_handle_still_commits() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("drop.hdb");

    {
        let mut db = Database::open_with_config(&path, config().fast_write(true)).unwrap();
        db.store(b"k", b"v", StoreMode::Replace).unwrap();
    }

    let mut db = Database::open_with_config(&path, config()).unwrap();
    assert_eq!(db.fetch(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn mapped_database_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mapped.hdb");
    let data = entries(400);

    {
        let mut db =
            Database::open_with_config(&path, config().memory_map(true).fast_write(true)).unwrap();
        assert!(db.stats().unwrap().mapped);
        for (key, value) in &data {
            db.store(key, value, StoreMode::Replace).unwrap();
        }
        for (key, value) in &data {
            assert_eq!(db.fetch(key).unwrap().as_ref(), Some(value));
        }
        db.close().unwrap();
    }

    let mut db = Database::open_with_config(&path, config().read_only(true)).unwrap();
    for (key, value) in &data {
        assert_eq!(db.fetch(key).unwrap().as_ref(), Some(value));
    }
}

#[test]
fn writer_excludes_other_handles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("locked.hdb");

    let writer = Database::open_with_config(&path, config()).unwrap();
    assert!(matches!(
        Database::open_with_config(&path, config()),
        Err(CoreError::DatabaseLocked)
    ));
    assert!(matches!(
        Database::open_with_config(&path, config().read_only(true)),
        Err(CoreError::DatabaseLocked)
    ));
    writer.close().unwrap();

    let first = Database::open_with_config(&path, config().read_only(true)).unwrap();
    let second = Database::open_with_config(&path, config().read_only(true)).unwrap();
    assert!(matches!(
        Database::open_with_config(&path, config()),
        Err(CoreError::DatabaseLocked)
    ));
    drop(first);
    drop(second);
}

#[test]
fn open_flags() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flags.hdb");

    assert!(matches!(
        Database::open_with_config(&path, config().create_if_missing(false)),
        Err(CoreError::NotFound)
    ));
    assert!(matches!(
        Database::open_with_config(&path, config().read_only(true)),
        Err(CoreError::NotFound)
    ));

    Database::open_with_config(&path, config()).unwrap().close().unwrap();

    assert!(matches!(
        Database::open_with_config(&path, config().error_if_exists(true)),
        Err(CoreError::AlreadyExists)
    ));
}

#[test]
fn existing_file_keeps_its_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("geometry.hdb");

    Database::open_with_config(&path, Config::new().block_size(1024))
        .unwrap()
        .close()
        .unwrap();

    let db = Database::open_with_config(&path, Config::new().block_size(4096)).unwrap();
    assert_eq!(db.stats().unwrap().block_size, 1024);
}

/// The file after each commit, with its header block swapped for the one
/// the previous commit left, still opens and still holds every key the
/// previous commit held.
#[test]
fn stale_header_still_opens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("torn.hdb");
    let data = entries(300);

    let mut db = Database::open_with_config(&path, config()).unwrap();
    let mut previous = fs::read(&path).unwrap();
    let mut committed: Vec<&Vec<u8>> = Vec::new();

    for (key, value) in &data {
        db.store(key, value, StoreMode::Insert).unwrap();
        let current = fs::read(&path).unwrap();

        let mut torn = current.clone();
        torn[..512].copy_from_slice(&previous[..512]);
        let mut reopened =
            Database::open_with_backend(config(), Box::new(InMemoryBackend::with_data(torn)))
                .unwrap();
        for old in &committed {
            assert_eq!(reopened.fetch(old).unwrap().as_ref(), data.get(*old));
        }

        committed.push(key);
        previous = current;
    }
}
