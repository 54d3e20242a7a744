//! Focused graph construction.
//!
//! Builds a [`MappingGraph`] from raw metadata in three phases:
//! 1. Match: tables whose name contains a pattern seed the node set.
//! 2. Expansion: breadth-first closure over foreign keys (both directions)
//!    up to the expansion depth.
//! 3. Edges: every foreign key with both ends in the final node set.
//!
//! Nodes are fixed before any edge is collected, so edges never point
//! outside the graph.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, warn};

use super::{
    ColumnInfo, MappingGraph, MappingWarning, NodeOrigin, RelationshipEdge, TableNode,
    TablePatterns,
};
use crate::cache::{compute_hash, unix_now};
use crate::metadata::{RawMetadata, RawTable};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during graph construction.
#[derive(Debug, thiserror::Error)]
pub enum GraphBuildError {
    #[error("Empty pattern set: supply at least one non-blank table pattern")]
    EmptyPatternSet,

    #[error("Failed to fingerprint graph: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

pub type GraphBuildResult<T> = Result<T, GraphBuildError>;

/// Build a focused graph from plain pattern strings.
///
/// Convenience wrapper over [`MappingGraph::build`] that validates the
/// patterns first.
pub fn build<S: AsRef<str>>(
    patterns: &[S],
    expansion_depth: usize,
    metadata: &RawMetadata,
) -> GraphBuildResult<MappingGraph> {
    let patterns = TablePatterns::new(patterns)?;
    MappingGraph::build(&patterns, expansion_depth, metadata)
}

// ============================================================================
// Construction Entry Point
// ============================================================================

impl MappingGraph {
    /// Construct the focused graph for `patterns` over `metadata`.
    ///
    /// `expansion_depth` 0 keeps only matched tables. Zero matches is not an
    /// error: the empty graph carries [`MappingWarning::NoTablesMatched`].
    /// The builder has no side effects; callers decide whether to cache.
    pub fn build(
        patterns: &TablePatterns,
        expansion_depth: usize,
        metadata: &RawMetadata,
    ) -> GraphBuildResult<Self> {
        let catalog = Catalog::new(metadata);

        // Phase 1: match
        let matched = catalog.match_tables(patterns);
        debug!(
            patterns = %patterns,
            candidates = catalog.tables.len(),
            matched = matched.len(),
            "match stage complete"
        );

        // Phase 2: expansion
        let reached = catalog.expand(&matched, expansion_depth);
        debug!(
            expansion_depth,
            nodes = reached.len(),
            expanded = reached.len() - matched.len(),
            "expansion stage complete"
        );

        let nodes: Vec<TableNode> = reached
            .into_iter()
            .map(|(name, (origin, hops))| catalog.node(name, origin, hops))
            .collect();

        // Phase 3: edges between final nodes only
        let edges = catalog.collect_edges(&nodes);
        debug!(edges = edges.len(), "edge collection complete");

        let mut warnings = Vec::new();
        if nodes.is_empty() {
            warn!(patterns = %patterns, "no tables matched the mapping patterns");
            warnings.push(MappingWarning::NoTablesMatched);
        }

        let fingerprint = compute_hash(&(&nodes, &edges))?;

        Ok(MappingGraph {
            patterns: patterns.clone(),
            expansion_depth,
            built_at: unix_now(),
            fingerprint,
            nodes,
            edges,
            warnings,
        })
    }
}

// ============================================================================
// Catalog index over raw metadata
// ============================================================================

/// Lookup structures over one introspection result.
struct Catalog<'a> {
    /// Listed tables by qualified name.
    tables: BTreeMap<String, &'a RawTable>,
    /// Lower-cased qualified name -> listed qualified name.
    by_lowercase: HashMap<String, String>,
    /// Foreign keys with endpoints resolved to catalog names.
    foreign_keys: Vec<RelationshipEdge>,
    /// Undirected adjacency over `foreign_keys`.
    adjacency: HashMap<String, Vec<String>>,
}

impl<'a> Catalog<'a> {
    fn new(metadata: &'a RawMetadata) -> Self {
        let mut tables = BTreeMap::new();
        for table in &metadata.tables {
            let name = table.qualified_name();
            if tables.contains_key(&name) {
                debug!(table = %name, "duplicate table in metadata, keeping first");
                continue;
            }
            tables.insert(name, table);
        }

        let by_lowercase = tables
            .keys()
            .map(|name| (name.to_lowercase(), name.clone()))
            .collect();

        let mut catalog = Self {
            tables,
            by_lowercase,
            foreign_keys: Vec::with_capacity(metadata.foreign_keys.len()),
            adjacency: HashMap::new(),
        };

        for fk in &metadata.foreign_keys {
            let source = catalog.canonical_name(&fk.from_table);
            let target = catalog.canonical_name(&fk.to_table);
            catalog
                .adjacency
                .entry(source.clone())
                .or_default()
                .push(target.clone());
            catalog
                .adjacency
                .entry(target.clone())
                .or_default()
                .push(source.clone());
            catalog
                .foreign_keys
                .push(RelationshipEdge::from_raw(fk, &source, &target));
        }

        catalog
    }

    /// Map a foreign-key endpoint onto a listed table name.
    ///
    /// Engines disagree on identifier case between catalog views, so an
    /// exact miss falls back to a case-insensitive lookup. Endpoints that
    /// match nothing keep their reported name.
    fn canonical_name(&self, name: &str) -> String {
        if self.tables.contains_key(name) {
            return name.to_string();
        }
        self.by_lowercase
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn match_tables(&self, patterns: &TablePatterns) -> Vec<String> {
        self.tables
            .iter()
            .filter(|(_, table)| patterns.matches(&table.name))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Breadth-first closure from the matched set.
    ///
    /// Returns every reached table with its origin and hop distance. Matched
    /// tables are seeded at hop 0, so a table both matched and reachable
    /// stays `Matched`.
    fn expand(&self, matched: &[String], depth: usize) -> BTreeMap<String, (NodeOrigin, usize)> {
        let mut reached: BTreeMap<String, (NodeOrigin, usize)> = matched
            .iter()
            .map(|name| (name.clone(), (NodeOrigin::Matched, 0)))
            .collect();
        let mut queue: VecDeque<(&str, usize)> =
            matched.iter().map(|name| (name.as_str(), 0)).collect();

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            let Some(neighbors) = self.adjacency.get(current) else {
                continue;
            };
            for neighbor in neighbors {
                if !reached.contains_key(neighbor) {
                    reached.insert(neighbor.clone(), (NodeOrigin::Expansion, hops + 1));
                    queue.push_back((neighbor.as_str(), hops + 1));
                }
            }
        }

        reached
    }

    fn node(&self, name: String, origin: NodeOrigin, hops: usize) -> TableNode {
        let columns = match self.tables.get(&name) {
            Some(table) => table.columns.iter().map(ColumnInfo::from).collect(),
            None => {
                debug!(
                    table = %name,
                    "table referenced by a foreign key but not listed; no column info"
                );
                Vec::new()
            }
        };
        TableNode {
            name,
            columns,
            origin,
            hops,
        }
    }

    fn collect_edges(&self, nodes: &[TableNode]) -> Vec<RelationshipEdge> {
        let in_graph = |name: &str| {
            nodes
                .binary_search_by(|n| n.name.as_str().cmp(name))
                .is_ok()
        };

        let mut edges: Vec<RelationshipEdge> = self
            .foreign_keys
            .iter()
            .filter(|e| in_graph(&e.source_table) && in_graph(&e.target_table))
            .cloned()
            .collect();
        edges.sort();
        // Only byte-identical duplicates collapse; distinct FKs between the
        // same pair of tables all stay.
        edges.dedup();
        edges
    }
}
