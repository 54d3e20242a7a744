//! Integration tests for the file-backed cache store.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use schemascope::cache::{CacheStore, MappingKey, PathKey, DEFAULT_BUSY_TIMEOUT};
use schemascope::config::ConnectionIdentity;
use schemascope::graph::{self, MappingGraph, PathQuery};
use schemascope::metadata::{RawForeignKey, RawMetadata, RawTable};
use schemascope::Namespace;
use tempfile::TempDir;

fn sample_graph() -> MappingGraph {
    let metadata = RawMetadata::new(
        vec![
            RawTable::new("user_account"),
            RawTable::new("role"),
            RawTable::new("order_log"),
        ],
        vec![RawForeignKey::new("user_account", "role_id", "role", "id")],
    );
    graph::build(&["user"], 1, &metadata).unwrap()
}

fn identity() -> ConnectionIdentity {
    ConnectionIdentity::sqlite("/srv/app.db")
}

#[test]
fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let graph = sample_graph();
    let key = MappingKey::for_graph(&identity(), &graph);

    {
        let store = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        store.mappings().put(&key, &graph).unwrap();
    }

    let store = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert_eq!(store.mappings().get(&key).unwrap(), Some(graph));
}

#[test]
fn test_creates_missing_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("cache.db");

    CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert!(path.exists());
}

#[test]
fn test_non_database_file_is_recreated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    std::fs::write(&path, "plain text, not a database\n".repeat(200)).unwrap();

    let store = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert_eq!(store.stats(Namespace::Mapping).unwrap().entry_count, 0);

    let graph = sample_graph();
    let key = MappingKey::for_graph(&identity(), &graph);
    store.mappings().put(&key, &graph).unwrap();
    assert!(store.mappings().get(&key).unwrap().is_some());
}

#[test]
fn test_corrupted_payload_on_disk_is_dropped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let graph = sample_graph();
    let key = MappingKey::for_graph(&identity(), &graph);
    let fingerprint = key.fingerprint().unwrap();

    {
        let store = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        store.mappings().put(&key, &graph).unwrap();
    }

    // Another process scribbles over the payload.
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE mapping_entries SET payload = '{\"nodes\": 3' WHERE fingerprint = ?1",
            [&fingerprint],
        )
        .unwrap();
    }

    let store = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert!(store.mappings().get(&key).unwrap().is_none());
    assert_eq!(store.stats(Namespace::Mapping).unwrap().entry_count, 0);
}

#[test]
fn test_corrupted_entry_is_a_miss_while_the_file_is_locked() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let graph = sample_graph();
    let key = MappingKey::for_graph(&identity(), &graph);
    let fingerprint = key.fingerprint().unwrap();

    let store = CacheStore::open(&path, Duration::from_millis(50)).unwrap();
    store.mappings().put(&key, &graph).unwrap();

    let other = Connection::open(&path).unwrap();
    other
        .execute(
            "UPDATE mapping_entries SET payload = 'garbage' WHERE fingerprint = ?1",
            [&fingerprint],
        )
        .unwrap();

    // Another writer holds the lock, so the corrupted row cannot be deleted.
    other.execute_batch("BEGIN IMMEDIATE").unwrap();
    assert!(store.mappings().get(&key).unwrap().is_none());
    assert_eq!(store.stats(Namespace::Mapping).unwrap().entry_count, 1);
    other.execute_batch("ROLLBACK").unwrap();

    // Once the lock is released the next read drops it.
    assert!(store.mappings().get(&key).unwrap().is_none());
    assert_eq!(store.stats(Namespace::Mapping).unwrap().entry_count, 0);
}

#[test]
fn test_version_mismatch_clears_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let graph = sample_graph();
    let key = MappingKey::for_graph(&identity(), &graph);

    {
        let store = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        store.mappings().put(&key, &graph).unwrap();
    }
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE meta SET value = '0' WHERE key = 'version'", [])
            .unwrap();
    }

    let store = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert!(store.mappings().get(&key).unwrap().is_none());
}

#[test]
fn test_two_handles_on_one_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let writer = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let reader = CacheStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();

    let graph = sample_graph();
    let query = PathQuery::default();
    let paths = graph.find_paths("user_account", "role", &query).unwrap();
    let key = PathKey::new(&graph, "user_account", "role", &query);

    writer.paths().put(&key, &paths).unwrap();
    assert_eq!(reader.paths().get(&key).unwrap(), Some(paths));
}

#[test]
fn test_concurrent_writers_to_one_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let shared = Arc::new(CacheStore::open(&path, Duration::from_secs(10)).unwrap());
    let graph = Arc::new(sample_graph());
    let key = MappingKey::for_graph(&identity(), &graph);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            // Half the writers share a handle, half open their own.
            let store = if i % 2 == 0 {
                Arc::clone(&shared)
            } else {
                Arc::new(CacheStore::open(&path, Duration::from_secs(10)).unwrap())
            };
            let graph = Arc::clone(&graph);
            let key = key.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    store.mappings().put(&key, &graph).unwrap();
                    assert!(store.mappings().get(&key).unwrap().is_some());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.stats(Namespace::Mapping).unwrap().entry_count, 1);
    assert_eq!(shared.mappings().get(&key).unwrap().as_ref(), Some(&*graph));
}

#[test]
fn test_summaries_and_stats() {
    let store = CacheStore::open_in_memory().unwrap();
    let graph = sample_graph();
    let key = MappingKey::for_graph(&identity(), &graph);
    store.mappings().put(&key, &graph).unwrap();

    let summaries = store.mappings().summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].key.patterns, vec!["user"]);
    assert_eq!(summaries[0].key.connection, identity());
    assert_eq!(summaries[0].table_count, 2);
    assert_eq!(summaries[0].edge_count, 1);

    let stats = store.stats(Namespace::Mapping).unwrap();
    assert_eq!(stats.entry_count, 1);
    assert!(stats.total_size_bytes > 0);
    assert!(stats.oldest_entry_age.unwrap() < Duration::from_secs(60));
}
