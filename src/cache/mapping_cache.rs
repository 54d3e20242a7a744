//! Mapping namespace: built graphs keyed by connection, patterns and depth.

use std::time::Duration;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{age_since, compute_hash, CacheResult, CacheStats, CacheStore, Namespace};
use crate::config::ConnectionIdentity;
use crate::graph::{MappingGraph, TablePatterns};

/// Fields identifying one mapping run.
///
/// Patterns are stored in canonical form, so `["WF", "user"]` and
/// `["user", "wf", "wf"]` share an entry. Credentials never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingKey {
    pub connection: ConnectionIdentity,
    pub patterns: Vec<String>,
    pub expansion_depth: usize,
}

impl MappingKey {
    pub fn new(
        connection: &ConnectionIdentity,
        patterns: &TablePatterns,
        expansion_depth: usize,
    ) -> Self {
        Self {
            connection: connection.clone(),
            patterns: patterns.canonical(),
            expansion_depth,
        }
    }

    /// Key a graph was (or would be) stored under.
    pub fn for_graph(connection: &ConnectionIdentity, graph: &MappingGraph) -> Self {
        Self::new(connection, graph.patterns(), graph.expansion_depth())
    }

    /// SHA-256 over the key fields.
    pub fn fingerprint(&self) -> CacheResult<String> {
        Ok(compute_hash(self)?)
    }
}

/// One row of the mapping namespace, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingSummary {
    pub fingerprint: String,
    pub key: MappingKey,
    pub table_count: usize,
    pub edge_count: usize,
    pub created_at: i64,
    pub age: Duration,
}

/// Just enough of a stored graph to count it.
#[derive(Deserialize)]
struct GraphCounts {
    nodes: Vec<IgnoredAny>,
    edges: Vec<IgnoredAny>,
}

/// Typed view over [`Namespace::Mapping`].
#[derive(Debug, Clone, Copy)]
pub struct MappingCache<'a> {
    store: &'a CacheStore,
}

impl<'a> MappingCache<'a> {
    pub(super) fn new(store: &'a CacheStore) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &MappingKey) -> CacheResult<Option<MappingGraph>> {
        self.store.get(Namespace::Mapping, &key.fingerprint()?)
    }

    pub fn get_by_fingerprint(&self, fingerprint: &str) -> CacheResult<Option<MappingGraph>> {
        self.store.get(Namespace::Mapping, fingerprint)
    }

    /// Store `graph`, replacing any previous graph for the same key.
    pub fn put(&self, key: &MappingKey, graph: &MappingGraph) -> CacheResult<String> {
        self.store
            .put(Namespace::Mapping, key, graph, graph.fingerprint())
    }

    pub fn invalidate(&self, key: &MappingKey) -> CacheResult<bool> {
        self.store.invalidate(Namespace::Mapping, &key.fingerprint()?)
    }

    pub fn clear(&self) -> CacheResult<usize> {
        self.store.clear(Namespace::Mapping)
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.store.stats(Namespace::Mapping)
    }

    /// Every stored mapping with its size and age, newest first.
    ///
    /// Rows that fail to decode are skipped; the next `get` on them drops
    /// them.
    pub fn summaries(&self) -> CacheResult<Vec<MappingSummary>> {
        let rows = self.store.rows(Namespace::Mapping)?;
        let mut summaries = Vec::with_capacity(rows.len());

        for row in rows {
            let key = serde_json::from_str::<MappingKey>(&row.key_json);
            let counts = serde_json::from_str::<GraphCounts>(&row.payload);
            match (key, counts) {
                (Ok(key), Ok(counts)) => summaries.push(MappingSummary {
                    fingerprint: row.fingerprint,
                    key,
                    table_count: counts.nodes.len(),
                    edge_count: counts.edges.len(),
                    created_at: row.created_at,
                    age: age_since(row.created_at),
                }),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(fingerprint = %row.fingerprint, error = %e, "skipping unreadable mapping entry");
                }
            }
        }

        Ok(summaries)
    }
}
