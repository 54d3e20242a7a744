//! Integration tests for focused mapping through the mapper API.
//!
//! Catalogs are loaded through the snapshot introspector, the same path a
//! captured production catalog takes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use schemascope::config::ConnectionIdentity;
use schemascope::graph::MappingWarning;
use schemascope::metadata::{
    IntrospectResult, RawForeignKey, RawMetadata, RawTable, SchemaIntrospector,
    StaticIntrospector,
};
use schemascope::{CacheStore, ErrorKind, FocusedMapper, MapperSettings, Namespace};

const WORKFLOW_CATALOG: &str = r#"{
    "tables": [
        {"schema": "erp", "name": "wf_definition", "columns": [
            {"name": "id", "data_type": "bigint", "primary_key": true, "nullable": false},
            {"name": "owner_id", "data_type": "bigint"}
        ]},
        {"schema": "erp", "name": "wf_instance", "columns": [
            {"name": "id", "data_type": "bigint", "primary_key": true, "nullable": false},
            {"name": "definition_id", "data_type": "bigint", "nullable": false}
        ]},
        {"schema": "erp", "name": "activity_log", "columns": [
            {"name": "id", "data_type": "bigint", "primary_key": true, "nullable": false},
            {"name": "instance_id", "data_type": "bigint"}
        ]},
        {"schema": "erp", "name": "employee", "columns": [
            {"name": "id", "data_type": "bigint", "primary_key": true, "nullable": false},
            {"name": "department_id", "data_type": "bigint"}
        ]},
        {"schema": "erp", "name": "department", "columns": [
            {"name": "id", "data_type": "bigint", "primary_key": true, "nullable": false}
        ]},
        {"schema": "erp", "name": "invoice", "columns": [
            {"name": "id", "data_type": "bigint", "primary_key": true, "nullable": false}
        ]}
    ],
    "foreign_keys": [
        {"from_table": "erp.wf_instance", "from_column": "definition_id",
         "to_table": "erp.wf_definition", "to_column": "id", "constraint_name": "fk_instance_definition"},
        {"from_table": "erp.activity_log", "from_column": "instance_id",
         "to_table": "erp.wf_instance", "to_column": "id"},
        {"from_table": "erp.wf_definition", "from_column": "owner_id",
         "to_table": "erp.employee", "to_column": "id"},
        {"from_table": "erp.employee", "from_column": "department_id",
         "to_table": "erp.department", "to_column": "id"}
    ]
}"#;

fn catalog() -> RawMetadata {
    serde_json::from_str(WORKFLOW_CATALOG).unwrap()
}

/// Snapshot introspector that counts introspection passes.
struct CountingSnapshot {
    inner: StaticIntrospector,
    passes: Arc<AtomicUsize>,
}

#[async_trait]
impl SchemaIntrospector for CountingSnapshot {
    async fn list_tables(&self) -> IntrospectResult<Vec<RawTable>> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        self.inner.list_tables().await
    }

    async fn list_foreign_keys(&self) -> IntrospectResult<Vec<RawForeignKey>> {
        self.inner.list_foreign_keys().await
    }
}

fn mapper_with(
    metadata: RawMetadata,
    store: Arc<CacheStore>,
) -> (FocusedMapper<CountingSnapshot>, Arc<AtomicUsize>) {
    let passes = Arc::new(AtomicUsize::new(0));
    let introspector = CountingSnapshot {
        inner: StaticIntrospector::new(metadata),
        passes: Arc::clone(&passes),
    };
    let mapper = FocusedMapper::new(
        introspector,
        ConnectionIdentity::snapshot("erp.json"),
        store,
    );
    (mapper, passes)
}

fn in_memory_store() -> Arc<CacheStore> {
    Arc::new(CacheStore::open_in_memory().unwrap())
}

// ============================================================================
// Mapping
// ============================================================================

#[tokio::test]
async fn test_workflow_patterns_depth_one() {
    let (mapper, _) = mapper_with(catalog(), in_memory_store());
    let graph = mapper.map_focused(&["wf", "activity"], 1).await.unwrap();

    let names: Vec<&str> = graph.nodes().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "erp.activity_log",
            "erp.employee",
            "erp.wf_definition",
            "erp.wf_instance"
        ]
    );
    assert_eq!(graph.matched_tables().count(), 3);
    assert!(graph.node("erp.employee").unwrap().included_by_expansion());
    assert!(!graph.contains("erp.department"));
    assert!(!graph.contains("erp.invoice"));
    assert_eq!(graph.edge_count(), 3);

    let definition = graph.node("erp.wf_definition").unwrap();
    assert_eq!(definition.primary_key().count(), 1);
    assert_eq!(definition.column("owner_id").unwrap().data_type, "bigint");

    let constrained = graph
        .edges()
        .iter()
        .find(|e| e.source_table == "erp.wf_instance")
        .unwrap();
    assert_eq!(
        constrained.constraint_name.as_deref(),
        Some("fk_instance_definition")
    );
}

#[tokio::test]
async fn test_deeper_expansion_reaches_department() {
    let (mapper, _) = mapper_with(catalog(), in_memory_store());
    let graph = mapper.map_focused(&["activity"], 4).await.unwrap();

    assert_eq!(graph.table_count(), 5);
    assert_eq!(graph.node("erp.department").unwrap().hops, 4);
    assert!(!graph.contains("erp.invoice"));
}

#[tokio::test]
async fn test_patterns_that_match_nothing() {
    let store = in_memory_store();
    let (mapper, _) = mapper_with(catalog(), Arc::clone(&store));
    let graph = mapper.map_focused(&["payroll"], 2).await.unwrap();

    assert!(graph.is_empty());
    assert!(graph.has_warning(MappingWarning::NoTablesMatched));
    assert_eq!(store.stats(Namespace::Mapping).unwrap().entry_count, 0);
}

#[tokio::test]
async fn test_default_patterns_from_settings() {
    let (mapper, _) = mapper_with(catalog(), in_memory_store());
    let mapper = mapper.with_settings(MapperSettings::default());

    // The default pattern set includes "wf", "activity" and "process".
    let graph = mapper.map_default().await.unwrap();
    assert!(graph.contains("erp.wf_instance"));
    assert!(graph.contains("erp.activity_log"));
}

// ============================================================================
// Cache interplay
// ============================================================================

#[tokio::test]
async fn test_cached_mapping_skips_introspection() {
    let (mapper, passes) = mapper_with(catalog(), in_memory_store());

    let first = mapper.map_focused(&["wf"], 1).await.unwrap();
    let second = mapper.map_focused(&["WF"], 1).await.unwrap();

    assert_eq!(passes.load(Ordering::SeqCst), 1);
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[tokio::test]
async fn test_depth_is_part_of_the_key() {
    let (mapper, passes) = mapper_with(catalog(), in_memory_store());

    mapper.map_focused(&["wf"], 1).await.unwrap();
    mapper.map_focused(&["wf"], 2).await.unwrap();

    assert_eq!(passes.load(Ordering::SeqCst), 2);
    assert_eq!(mapper.mapping_summaries().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sessions_share_a_store() {
    let store = in_memory_store();
    let (first, first_passes) = mapper_with(catalog(), Arc::clone(&store));
    let (second, second_passes) = mapper_with(catalog(), Arc::clone(&store));

    first.map_focused(&["wf"], 1).await.unwrap();
    second.map_focused(&["wf"], 1).await.unwrap();

    assert_eq!(first_passes.load(Ordering::SeqCst), 1);
    assert_eq!(second_passes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refresh_picks_up_catalog_changes() {
    let store = in_memory_store();
    let (before, _) = mapper_with(catalog(), Arc::clone(&store));
    let old = before.map_focused(&["wf"], 1).await.unwrap();

    let mut changed = catalog();
    changed.tables.push(RawTable::new("wf_comment").in_schema("erp"));
    changed.foreign_keys.push(RawForeignKey::new(
        "erp.wf_comment",
        "instance_id",
        "erp.wf_instance",
        "id",
    ));
    let (after, _) = mapper_with(changed, Arc::clone(&store));

    // Plain mapping still serves the cached graph.
    let cached = after.map_focused(&["wf"], 1).await.unwrap();
    assert_eq!(cached.fingerprint(), old.fingerprint());

    let fresh = after.refresh_mapping(&["wf"], 1).await.unwrap();
    assert!(fresh.contains("erp.wf_comment"));
    assert_ne!(fresh.fingerprint(), old.fingerprint());

    // The refreshed graph replaced the cached one.
    let reread = after.map_focused(&["wf"], 1).await.unwrap();
    assert_eq!(reread.fingerprint(), fresh.fingerprint());
    assert_eq!(after.mapping_summaries().unwrap().len(), 1);
}

#[tokio::test]
async fn test_refresh_to_empty_evicts_cached_graph() {
    let store = in_memory_store();
    let (before, _) = mapper_with(catalog(), Arc::clone(&store));
    let old = before.map_focused(&["wf"], 1).await.unwrap();
    before
        .find_path(&old, "erp.wf_instance", "erp.wf_definition", 3, 5)
        .unwrap();
    assert_eq!(store.stats(Namespace::Path).unwrap().entry_count, 1);

    // The workflow tables were dropped from the catalog.
    let mut emptied = catalog();
    emptied.tables.retain(|t| !t.name.starts_with("wf_"));
    emptied
        .foreign_keys
        .retain(|fk| !fk.from_table.contains("wf_") && !fk.to_table.contains("wf_"));
    let (after, passes) = mapper_with(emptied, Arc::clone(&store));

    let fresh = after.refresh_mapping(&["wf"], 1).await.unwrap();
    assert!(fresh.has_warning(MappingWarning::NoTablesMatched));

    let reread = after.map_focused(&["wf"], 1).await.unwrap();
    assert!(reread.is_empty());
    assert_eq!(passes.load(Ordering::SeqCst), 2);
    assert_eq!(store.stats(Namespace::Mapping).unwrap().entry_count, 0);
    assert_eq!(store.stats(Namespace::Path).unwrap().entry_count, 0);
}

#[tokio::test]
async fn test_configuration_errors() {
    let (mapper, passes) = mapper_with(catalog(), in_memory_store());

    let empty: [&str; 0] = [];
    let err = mapper.map_focused(&empty, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = mapper.map_focused(&["wf"], 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    assert_eq!(passes.load(Ordering::SeqCst), 0);
}
