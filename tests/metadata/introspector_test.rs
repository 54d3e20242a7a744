//! Integration tests for the SQLite and snapshot introspectors.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use schemascope::metadata::{
    IntrospectError, SchemaIntrospector, SchemaIntrospectorExt, SqliteIntrospector,
    StaticIntrospector,
};
use schemascope::{CacheStore, FocusedMapper};
use tempfile::TempDir;

const TICKETING_DDL: &str = "
    CREATE TABLE role (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL
    );
    CREATE TABLE user_account (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL,
        role_id INTEGER REFERENCES role (id)
    );
    CREATE TABLE ticket (
        id INTEGER PRIMARY KEY,
        opened_by INTEGER NOT NULL REFERENCES user_account (id),
        assignee INTEGER REFERENCES user_account
    );
    CREATE TABLE audit_note (
        id INTEGER PRIMARY KEY,
        body TEXT
    );
";

fn create_database(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(TICKETING_DDL).unwrap();
}

fn ticketing_db() -> (TempDir, SqliteIntrospector) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticketing.db");
    create_database(&path);
    (dir, SqliteIntrospector::new(path))
}

// ============================================================================
// SqliteIntrospector
// ============================================================================

#[tokio::test]
async fn test_sqlite_lists_tables_with_columns() {
    let (_dir, introspector) = ticketing_db();

    let tables = introspector.list_tables().await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["audit_note", "role", "ticket", "user_account"]);
    assert!(tables.iter().all(|t| t.schema.is_none()));

    let users = tables.iter().find(|t| t.name == "user_account").unwrap();
    let columns: Vec<&str> = users.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "email", "role_id"]);

    let id = &users.columns[0];
    assert!(id.primary_key);
    assert!(!id.nullable);
    assert_eq!(id.data_type, "INTEGER");

    assert!(!users.columns[1].nullable);
    assert!(users.columns[2].nullable);
}

#[tokio::test]
async fn test_sqlite_lists_foreign_keys() {
    let (_dir, introspector) = ticketing_db();

    let mut foreign_keys = introspector.list_foreign_keys().await.unwrap();
    foreign_keys.sort_by(|a, b| {
        (&a.from_table, &a.from_column).cmp(&(&b.from_table, &b.from_column))
    });

    let described: Vec<(&str, &str, &str, &str)> = foreign_keys
        .iter()
        .map(|fk| {
            (
                fk.from_table.as_str(),
                fk.from_column.as_str(),
                fk.to_table.as_str(),
                fk.to_column.as_str(),
            )
        })
        .collect();
    assert_eq!(
        described,
        vec![
            ("ticket", "assignee", "user_account", "id"),
            ("ticket", "opened_by", "user_account", "id"),
            ("user_account", "role_id", "role", "id"),
        ]
    );
    assert!(foreign_keys
        .iter()
        .all(|fk| fk.constraint_name.as_deref().is_some_and(|n| n.starts_with("fk_"))));
}

#[tokio::test]
async fn test_sqlite_introspect_combines_both() {
    let (_dir, introspector) = ticketing_db();

    let metadata = introspector.introspect().await.unwrap();
    assert_eq!(metadata.tables.len(), 4);
    assert_eq!(metadata.foreign_keys.len(), 3);
}

#[tokio::test]
async fn test_sqlite_missing_file_is_a_connection_failure() {
    let dir = TempDir::new().unwrap();
    let introspector = SqliteIntrospector::new(dir.path().join("absent.db"));

    let err = introspector.list_tables().await.unwrap_err();
    assert!(matches!(err, IntrospectError::ConnectionFailed(_)));
    // Read-only access never creates the file.
    assert!(!introspector.path().exists());
}

#[tokio::test]
async fn test_sqlite_catalog_through_the_mapper() {
    let (_dir, introspector) = ticketing_db();
    let identity = introspector.identity();
    let mapper = FocusedMapper::new(
        introspector,
        identity,
        Arc::new(CacheStore::open_in_memory().unwrap()),
    );

    let graph = mapper.map_focused(&["ticket"], 1).await.unwrap();
    assert!(graph.contains("ticket"));
    assert!(graph.contains("user_account"));
    assert!(!graph.contains("role"));
    assert!(!graph.contains("audit_note"));
    assert_eq!(graph.edge_count(), 2);

    let paths = mapper
        .find_path(&graph, "ticket", "user_account", 3, 10)
        .unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.len() == 1));
}

// ============================================================================
// StaticIntrospector
// ============================================================================

#[tokio::test]
async fn test_snapshot_file_round_trip_through_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"{
            "tables": [
                {"schema": "billing", "name": "invoice", "columns": [
                    {"name": "id", "data_type": "uuid", "primary_key": true, "nullable": false},
                    {"name": "customer_id", "data_type": "uuid"}
                ]},
                {"schema": "billing", "name": "customer"}
            ],
            "foreign_keys": [
                {"from_table": "billing.invoice", "from_column": "customer_id",
                 "to_table": "billing.customer", "to_column": "id"}
            ]
        }"#,
    )
    .unwrap();

    let introspector = StaticIntrospector::from_snapshot_file(&path).unwrap();
    let metadata = introspector.introspect().await.unwrap();

    assert_eq!(metadata.tables.len(), 2);
    assert_eq!(metadata.tables[0].qualified_name(), "billing.invoice");
    assert!(metadata.tables[1].columns.is_empty());
    assert_eq!(metadata.foreign_keys[0].to_table, "billing.customer");
    assert!(metadata.foreign_keys[0].constraint_name.is_none());
}

#[test]
fn test_snapshot_file_with_bad_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, r#"{"tables": [{"name": 42}]}"#).unwrap();

    let err = StaticIntrospector::from_snapshot_file(&path).unwrap_err();
    assert!(matches!(err, IntrospectError::SnapshotFormat { .. }));
}
