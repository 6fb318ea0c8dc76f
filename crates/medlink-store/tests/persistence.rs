//! On-disk behaviour of the SQLite store.

use medlink_store::{SCHEMA_VERSION, SqliteStore};
use medlink_types::KeyValueStore;

#[test]
fn values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pairing.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.set("paired_devices", r#"[{"id":"AA:BB"}]"#).unwrap();
        store.set("auto_connect", "false").unwrap();
        store.remove("auto_connect").unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert_eq!(
        store.get("paired_devices").unwrap().as_deref(),
        Some(r#"[{"id":"AA:BB"}]"#)
    );
    assert_eq!(store.get("auto_connect").unwrap(), None);
}

#[test]
fn creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("medlink").join("pairing.db");

    let store = SqliteStore::open(&path).unwrap();
    store.set("k", "v").unwrap();
    assert!(path.exists());
}

#[test]
fn reopening_keeps_schema_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pairing.db");
    drop(SqliteStore::open(&path).unwrap());

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
}

#[test]
fn shared_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(SqliteStore::open(dir.path().join("pairing.db")).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || store.set(&format!("key-{}", i), "v").unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.keys().unwrap().len(), 4);
}
