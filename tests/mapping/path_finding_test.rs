//! Integration tests for path queries over focused graphs.

use std::sync::Arc;

use schemascope::config::ConnectionIdentity;
use schemascope::graph::{self, Direction, MappingGraph, PathQuery};
use schemascope::metadata::{RawColumn, RawForeignKey, RawMetadata, RawTable, StaticIntrospector};
use schemascope::{CacheStore, ErrorKind, FocusedMapper, Namespace};

fn table(name: &str) -> RawTable {
    RawTable::new(name).with_column(RawColumn::new("id", "integer").primary_key())
}

/// user_account -> role; order_log stands alone.
fn accounts() -> RawMetadata {
    RawMetadata::new(
        vec![table("user_account"), table("role"), table("order_log")],
        vec![RawForeignKey::new("user_account", "role_id", "role", "id")],
    )
}

/// A small approval workflow:
///
/// ```text
/// approval_step -> workflow_run -> workflow -> user_account
/// approval_step -> user_account (approver)
/// workflow_run  -> user_account (started_by)
/// user_account  -> user_account (manager)
/// ```
fn approvals() -> RawMetadata {
    RawMetadata::new(
        vec![
            table("approval_step"),
            table("workflow_run"),
            table("workflow"),
            table("user_account"),
        ],
        vec![
            RawForeignKey::new("approval_step", "run_id", "workflow_run", "id"),
            RawForeignKey::new("workflow_run", "workflow_id", "workflow", "id"),
            RawForeignKey::new("workflow", "owner_id", "user_account", "id"),
            RawForeignKey::new("approval_step", "approver_id", "user_account", "id"),
            RawForeignKey::new("workflow_run", "started_by", "user_account", "id"),
            RawForeignKey::new("user_account", "manager_id", "user_account", "id"),
        ],
    )
}

async fn mapped(
    metadata: RawMetadata,
    patterns: &[&str],
    depth: usize,
) -> (FocusedMapper<StaticIntrospector>, MappingGraph) {
    let mapper = FocusedMapper::new(
        StaticIntrospector::new(metadata),
        ConnectionIdentity::snapshot("test.json"),
        Arc::new(CacheStore::open_in_memory().unwrap()),
    );
    let graph = mapper.map_focused(patterns, depth).await.unwrap();
    (mapper, graph)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_user_to_role() {
    let (mapper, graph) = mapped(accounts(), &["user"], 1).await;

    let paths = mapper
        .find_path(&graph, "user_account", "role", 5, 10)
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].len(), 1);

    let step = &paths[0].steps[0];
    assert_eq!(step.direction, Direction::Forward);
    assert_eq!(step.edge.source_column, "role_id");
    assert_eq!(step.edge.target_column, "id");
}

#[tokio::test]
async fn test_disjoint_tables_have_no_path() {
    let (mapper, graph) = mapped(accounts(), &["user", "order"], 1).await;
    assert!(graph.contains("order_log"));

    let paths = mapper
        .find_path(&graph, "user_account", "order_log", 5, 10)
        .unwrap();
    assert!(paths.is_empty());
}

#[tokio::test]
async fn test_table_outside_the_focus_is_not_found() {
    let (mapper, graph) = mapped(accounts(), &["user"], 1).await;

    let err = mapper
        .find_path(&graph, "user_account", "order_log", 5, 10)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_same_table() {
    let (mapper, graph) = mapped(accounts(), &["user"], 1).await;
    let paths = mapper
        .find_path(&graph, "user_account", "user_account", 5, 10)
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].is_empty());
}

// ============================================================================
// Multiple routes
// ============================================================================

#[tokio::test]
async fn test_shortest_routes_only_by_default() {
    let (mapper, graph) = mapped(approvals(), &["approval", "workflow", "user"], 0).await;

    let paths = mapper
        .find_path(&graph, "approval_step", "user_account", 5, 10)
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].tables(), vec!["approval_step", "user_account"]);
    assert_eq!(paths[0].steps[0].edge.source_column, "approver_id");
}

#[tokio::test]
async fn test_all_lengths() {
    let (mapper, graph) = mapped(approvals(), &["approval", "workflow", "user"], 0).await;
    let query = PathQuery::new(5, 10).with_longer_paths();

    let paths = mapper
        .find_paths_with(&graph, "approval_step", "user_account", &query)
        .unwrap();

    let routes: Vec<Vec<&str>> = paths.iter().map(|p| p.tables()).collect();
    assert_eq!(
        routes,
        vec![
            vec!["approval_step", "user_account"],
            vec!["approval_step", "workflow_run", "user_account"],
            vec!["approval_step", "workflow_run", "workflow", "user_account"],
        ]
    );
    // The self reference on user_account never shows up in a simple path.
    assert!(paths
        .iter()
        .flat_map(|p| p.edges())
        .all(|e| !e.is_self_reference()));
}

#[tokio::test]
async fn test_reverse_direction_is_reported() {
    let (mapper, graph) = mapped(approvals(), &["approval", "workflow", "user"], 0).await;

    let paths = mapper
        .find_path(&graph, "workflow", "workflow_run", 5, 10)
        .unwrap();
    assert_eq!(paths.len(), 1);
    let step = &paths[0].steps[0];
    assert_eq!(step.direction, Direction::Reverse);
    assert_eq!(step.edge.source_table, "workflow_run");
    assert_eq!(step.from_table(), "workflow");
}

#[tokio::test]
async fn test_max_depth_limits_routes() {
    let (mapper, graph) = mapped(approvals(), &["approval", "workflow", "user"], 0).await;
    let query = PathQuery::new(2, 10).with_longer_paths();

    let paths = mapper
        .find_paths_with(&graph, "approval_step", "user_account", &query)
        .unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.len() <= 2));
}

#[tokio::test]
async fn test_results_are_deterministic_across_builds() {
    let a = graph::build(&["approval", "workflow", "user"], 0, &approvals()).unwrap();
    let b = graph::build(&["user", "workflow", "approval"], 0, &approvals()).unwrap();
    let query = PathQuery::new(5, 10).with_longer_paths();

    assert_eq!(
        a.find_paths("workflow", "approval_step", &query).unwrap(),
        b.find_paths("workflow", "approval_step", &query).unwrap()
    );
}

// ============================================================================
// Path cache
// ============================================================================

#[tokio::test]
async fn test_path_results_are_cached_per_query() {
    let (mapper, graph) = mapped(approvals(), &["approval", "workflow", "user"], 0).await;
    let store = Arc::clone(mapper.store());

    mapper
        .find_path(&graph, "approval_step", "user_account", 5, 10)
        .unwrap();
    mapper
        .find_path(&graph, "Approval_Step", "USER_ACCOUNT", 5, 10)
        .unwrap();
    assert_eq!(store.stats(Namespace::Path).unwrap().entry_count, 1);

    mapper
        .find_path(&graph, "approval_step", "user_account", 3, 10)
        .unwrap();
    assert_eq!(store.stats(Namespace::Path).unwrap().entry_count, 2);
}

#[tokio::test]
async fn test_zero_max_results_is_rejected() {
    let (mapper, graph) = mapped(accounts(), &["user"], 1).await;
    let err = mapper
        .find_path(&graph, "user_account", "role", 5, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
