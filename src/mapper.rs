//! The focused mapper: the dashboard-facing entry point.
//!
//! Ties an introspector, the cache store and the graph algorithms together:
//!
//! ```text
//! map_focused(patterns, depth)
//!     │
//!     ├─ mapping cache hit ──────────────────────────────► MappingGraph
//!     │
//!     └─ miss ─► introspect() ─► MappingGraph::build ─► write-through ─► MappingGraph
//!
//! find_path(graph, source, destination, ...)
//!     │
//!     ├─ path cache hit ─────────────────────────────────► [PathResult]
//!     │
//!     └─ miss ─► graph.find_paths ─► write-through ──────► [PathResult]
//! ```
//!
//! The cache is an accelerator only. Failed reads are treated as misses and
//! failed writes are logged; neither fails the request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheStore, MappingKey, MappingSummary, Namespace, PathKey};
use crate::config::{ConnectionIdentity, MappingSettings, PathSettings, Settings};
use crate::error::{ConfigurationError, MapperError, MapperResult};
use crate::graph::{MappingGraph, MappingWarning, PathQuery, PathResult, TablePatterns};
use crate::metadata::{SchemaIntrospector, SchemaIntrospectorExt};

/// Defaults and limits applied by the mapper.
#[derive(Debug, Clone, Default)]
pub struct MapperSettings {
    pub mapping: MappingSettings,
    pub paths: PathSettings,
}

impl From<&Settings> for MapperSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            mapping: settings.mapping.clone(),
            paths: settings.paths.clone(),
        }
    }
}

impl MapperSettings {
    /// Path query built from the configured defaults.
    pub fn default_query(&self) -> PathQuery {
        PathQuery {
            max_depth: self.paths.max_depth,
            max_results: self.paths.max_results,
            shortest_only: self.paths.shortest_only,
        }
    }
}

/// What to drop from a cache namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateTarget {
    All,
    Fingerprint(String),
}

/// Statistics for both cache namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatsReport {
    pub mapping: CacheStats,
    pub path: CacheStats,
}

/// Focused relationship mapper over one database.
pub struct FocusedMapper<I> {
    introspector: I,
    connection: ConnectionIdentity,
    store: Arc<CacheStore>,
    settings: MapperSettings,
}

impl<I: SchemaIntrospector> FocusedMapper<I> {
    pub fn new(introspector: I, connection: ConnectionIdentity, store: Arc<CacheStore>) -> Self {
        Self {
            introspector,
            connection,
            store,
            settings: MapperSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: MapperSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn connection(&self) -> &ConnectionIdentity {
        &self.connection
    }

    pub fn settings(&self) -> &MapperSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn introspector(&self) -> &I {
        &self.introspector
    }

    /// Build (or load from cache) the focused graph for `patterns`.
    ///
    /// Fails when the pattern set is empty or `expansion_depth` exceeds the
    /// configured maximum. A graph with no matching tables is returned with
    /// [`MappingWarning::NoTablesMatched`] and is not cached; it evicts any
    /// graph previously cached for the same key.
    pub async fn map_focused<S: AsRef<str>>(
        &self,
        patterns: &[S],
        expansion_depth: usize,
    ) -> MapperResult<MappingGraph> {
        self.map(patterns, expansion_depth, true).await
    }

    /// Map with the configured default patterns and depth.
    pub async fn map_default(&self) -> MapperResult<MappingGraph> {
        let mapping = &self.settings.mapping;
        self.map(mapping.patterns.as_slice(), mapping.expansion_depth, true)
            .await
    }

    /// Rebuild from a fresh introspection, ignoring any cached graph.
    ///
    /// The result replaces the cached entry for the same key.
    pub async fn refresh_mapping<S: AsRef<str>>(
        &self,
        patterns: &[S],
        expansion_depth: usize,
    ) -> MapperResult<MappingGraph> {
        self.map(patterns, expansion_depth, false).await
    }

    async fn map<S: AsRef<str>>(
        &self,
        patterns: &[S],
        expansion_depth: usize,
        use_cache: bool,
    ) -> MapperResult<MappingGraph> {
        let patterns = TablePatterns::new(patterns)?;
        let max = self.settings.mapping.max_expansion_depth;
        if expansion_depth > max {
            return Err(ConfigurationError::DepthTooLarge {
                requested: expansion_depth,
                max,
            }
            .into());
        }

        let key = MappingKey::new(&self.connection, &patterns, expansion_depth);
        let mappings = self.store.mappings();

        if use_cache {
            match mappings.get(&key) {
                Ok(Some(graph)) => {
                    info!(
                        connection = %self.connection,
                        patterns = %patterns,
                        tables = graph.table_count(),
                        "mapping cache hit"
                    );
                    return Ok(graph);
                }
                Ok(None) => debug!(patterns = %patterns, "mapping cache miss"),
                Err(e) => warn!(error = %e, "mapping cache read failed, rebuilding"),
            }
        }

        let metadata = self.introspector.introspect().await?;
        let graph = MappingGraph::build(&patterns, expansion_depth, &metadata)?;

        if graph.has_warning(MappingWarning::NoTablesMatched) {
            // An older graph for this key no longer describes the catalog.
            match mappings.invalidate(&key) {
                Ok(true) => debug!("empty mapping replaced a cached graph"),
                Ok(false) => debug!("empty mapping not cached"),
                Err(e) => warn!(error = %e, "failed to drop stale cached mapping"),
            }
        } else if let Err(e) = mappings.put(&key, &graph) {
            warn!(error = %e, "failed to cache mapping");
        }

        info!(
            connection = %self.connection,
            patterns = %patterns,
            expansion_depth,
            tables = graph.table_count(),
            edges = graph.edge_count(),
            "focused mapping built"
        );
        Ok(graph)
    }

    /// Find paths with explicit limits and the configured `shortest_only`.
    pub fn find_path(
        &self,
        graph: &MappingGraph,
        source: &str,
        destination: &str,
        max_depth: usize,
        max_results: usize,
    ) -> MapperResult<Vec<PathResult>> {
        let query = PathQuery {
            max_depth,
            max_results,
            shortest_only: self.settings.paths.shortest_only,
        };
        self.find_paths_with(graph, source, destination, &query)
    }

    /// Find paths, consulting the path cache first.
    pub fn find_paths_with(
        &self,
        graph: &MappingGraph,
        source: &str,
        destination: &str,
        query: &PathQuery,
    ) -> MapperResult<Vec<PathResult>> {
        if query.max_results == 0 {
            return Err(ConfigurationError::ZeroMaxResults.into());
        }
        let source = graph
            .resolve_table(source)
            .ok_or_else(|| MapperError::UnknownTable(source.to_string()))?;
        let destination = graph
            .resolve_table(destination)
            .ok_or_else(|| MapperError::UnknownTable(destination.to_string()))?;

        let key = PathKey::new(graph, &source.name, &destination.name, query);
        let paths = self.store.paths();

        match paths.get(&key) {
            Ok(Some(cached)) => {
                debug!(
                    source = %source.name,
                    destination = %destination.name,
                    paths = cached.len(),
                    "path cache hit"
                );
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "path cache read failed, recomputing"),
        }

        let found = graph.find_paths(&source.name, &destination.name, query)?;
        if let Err(e) = paths.put(&key, &found) {
            warn!(error = %e, "failed to cache path result");
        }

        info!(
            source = %source.name,
            destination = %destination.name,
            max_depth = query.max_depth,
            paths = found.len(),
            "path search complete"
        );
        Ok(found)
    }

    /// Entry counts, sizes and ages for both namespaces.
    pub fn cache_stats(&self) -> MapperResult<CacheStatsReport> {
        Ok(CacheStatsReport {
            mapping: self.store.stats(Namespace::Mapping)?,
            path: self.store.stats(Namespace::Path)?,
        })
    }

    /// Drop one entry or a whole namespace. Returns the number removed.
    pub fn invalidate_cache(
        &self,
        namespace: Namespace,
        target: InvalidateTarget,
    ) -> MapperResult<usize> {
        let removed = match target {
            InvalidateTarget::All => self.store.clear(namespace)?,
            InvalidateTarget::Fingerprint(fingerprint) => {
                usize::from(self.store.invalidate(namespace, &fingerprint)?)
            }
        };
        info!(%namespace, removed, "cache invalidated");
        Ok(removed)
    }

    /// Cached mappings, newest first.
    pub fn mapping_summaries(&self) -> MapperResult<Vec<MappingSummary>> {
        Ok(self.store.mappings().summaries()?)
    }
}
