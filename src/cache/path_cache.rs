//! Path namespace: path query results keyed by graph content and query.

use serde::{Deserialize, Serialize};

use super::{compute_hash, CacheResult, CacheStats, CacheStore, Namespace};
use crate::graph::{MappingGraph, PathQuery, PathResult};

/// Fields identifying one path query.
///
/// `graph` is the content fingerprint of the graph searched, so a rebuilt
/// graph with different nodes or edges never serves stale paths. Source and
/// destination are the names after resolution against that graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathKey {
    pub graph: String,
    pub source: String,
    pub destination: String,
    pub max_depth: usize,
    pub max_results: usize,
    pub shortest_only: bool,
}

impl PathKey {
    pub fn new(graph: &MappingGraph, source: &str, destination: &str, query: &PathQuery) -> Self {
        Self {
            graph: graph.fingerprint().to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            max_depth: query.max_depth,
            max_results: query.max_results,
            shortest_only: query.shortest_only,
        }
    }

    pub fn fingerprint(&self) -> CacheResult<String> {
        Ok(compute_hash(self)?)
    }
}

/// Typed view over [`Namespace::Path`].
#[derive(Debug, Clone, Copy)]
pub struct PathCache<'a> {
    store: &'a CacheStore,
}

impl<'a> PathCache<'a> {
    pub(super) fn new(store: &'a CacheStore) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &PathKey) -> CacheResult<Option<Vec<PathResult>>> {
        self.store.get(Namespace::Path, &key.fingerprint()?)
    }

    pub fn put(&self, key: &PathKey, paths: &[PathResult]) -> CacheResult<String> {
        self.store.put(Namespace::Path, key, &paths, &key.graph)
    }

    pub fn invalidate(&self, key: &PathKey) -> CacheResult<bool> {
        self.store.invalidate(Namespace::Path, &key.fingerprint()?)
    }

    pub fn clear(&self) -> CacheResult<usize> {
        self.store.clear(Namespace::Path)
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.store.stats(Namespace::Path)
    }
}
