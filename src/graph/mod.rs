//! Focused mapping graph - the pattern-restricted table/foreign-key graph.
//!
//! A [`MappingGraph`] is produced by one mapping run and never mutated
//! afterwards. Re-mapping replaces it wholesale.

mod builder;
pub mod query;
pub mod types;

pub use builder::{build, GraphBuildError, GraphBuildResult};
pub use query::{Direction, PathQuery, PathQueryError, PathQueryResult, PathResult, PathStep};
pub use types::*;

use serde::{Deserialize, Serialize};

/// The restricted relationship graph for one pattern set.
///
/// Contains every table matched by a pattern, every table within the
/// configured number of foreign-key hops from a matched table, and every
/// foreign key whose two ends are both in that node set. Nodes are sorted by
/// name and edges by their lexical order, so two builds over the same
/// metadata are identical apart from `built_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingGraph {
    patterns: TablePatterns,
    expansion_depth: usize,
    /// Unix timestamp (seconds) of the build.
    built_at: i64,
    /// SHA-256 over nodes and edges.
    fingerprint: String,
    nodes: Vec<TableNode>,
    edges: Vec<RelationshipEdge>,
    #[serde(default)]
    warnings: Vec<MappingWarning>,
}

/// Columns and relationships of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo<'a> {
    pub table: &'a TableNode,
    /// Foreign keys declared on this table.
    pub outbound: Vec<&'a RelationshipEdge>,
    /// Foreign keys on other tables that reference this table.
    pub inbound: Vec<&'a RelationshipEdge>,
}

impl MappingGraph {
    pub fn patterns(&self) -> &TablePatterns {
        &self.patterns
    }

    pub fn expansion_depth(&self) -> usize {
        self.expansion_depth
    }

    pub fn built_at(&self) -> i64 {
        self.built_at
    }

    /// Content fingerprint; changes whenever the node or edge set changes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn nodes(&self) -> &[TableNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    pub fn warnings(&self) -> &[MappingWarning] {
        &self.warnings
    }

    pub fn has_warning(&self, warning: MappingWarning) -> bool {
        self.warnings.contains(&warning)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn table_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Tables matched directly by a pattern.
    pub fn matched_tables(&self) -> impl Iterator<Item = &TableNode> {
        self.nodes.iter().filter(|n| n.matched_by_pattern())
    }

    /// Tables pulled in only by the foreign-key closure.
    pub fn expansion_tables(&self) -> impl Iterator<Item = &TableNode> {
        self.nodes.iter().filter(|n| n.included_by_expansion())
    }

    /// Look up a table by its exact qualified name.
    pub fn node(&self, name: &str) -> Option<&TableNode> {
        self.nodes
            .binary_search_by(|n| n.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.nodes[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    /// Resolve a user-supplied table name.
    ///
    /// An exact match wins; otherwise a case-insensitive match is accepted
    /// only when exactly one table qualifies.
    pub fn resolve_table(&self, name: &str) -> Option<&TableNode> {
        if let Some(node) = self.node(name) {
            return Some(node);
        }
        let lowered = name.to_lowercase();
        let mut candidates = self.nodes.iter().filter(|n| n.name.to_lowercase() == lowered);
        match (candidates.next(), candidates.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    /// Table names containing `pattern` case-insensitively, sorted.
    pub fn search_tables(&self, pattern: &str) -> Vec<&str> {
        let pattern = pattern.to_lowercase();
        // nodes are already sorted by name
        self.nodes
            .iter()
            .filter(|n| n.name.to_lowercase().contains(&pattern))
            .map(|n| n.name.as_str())
            .collect()
    }

    /// Columns plus outbound and inbound foreign keys of one table.
    pub fn table_info(&self, name: &str) -> Option<TableInfo<'_>> {
        let table = self.resolve_table(name)?;
        let outbound = self
            .edges
            .iter()
            .filter(|e| e.source_table == table.name)
            .collect();
        let inbound = self
            .edges
            .iter()
            .filter(|e| e.target_table == table.name)
            .collect();
        Some(TableInfo {
            table,
            outbound,
            inbound,
        })
    }
}
