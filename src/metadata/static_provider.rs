//! In-memory and snapshot-file introspector.
//!
//! Serves metadata that was captured elsewhere: a JSON dump produced by an
//! external catalog tool, or metadata assembled in code for embedding and
//! tests.

use std::path::Path;

use async_trait::async_trait;

use super::provider::{IntrospectError, IntrospectResult, SchemaIntrospector};
use super::types::{RawForeignKey, RawMetadata, RawTable};

/// SchemaIntrospector backed by already-loaded metadata.
///
/// # Example
///
/// ```ignore
/// use schemascope::metadata::StaticIntrospector;
///
/// let introspector = StaticIntrospector::from_snapshot_file("catalog.json")?;
/// let tables = introspector.list_tables().await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticIntrospector {
    metadata: RawMetadata,
}

impl StaticIntrospector {
    pub fn new(metadata: RawMetadata) -> Self {
        Self { metadata }
    }

    /// Load a JSON snapshot of `{ "tables": [...], "foreign_keys": [...] }`.
    pub fn from_snapshot_file(path: impl AsRef<Path>) -> IntrospectResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| IntrospectError::SnapshotRead {
                path: path.display().to_string(),
                source,
            })?;
        let metadata =
            serde_json::from_str(&content).map_err(|source| IntrospectError::SnapshotFormat {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(metadata))
    }

    pub fn metadata(&self) -> &RawMetadata {
        &self.metadata
    }
}

#[async_trait]
impl SchemaIntrospector for StaticIntrospector {
    async fn list_tables(&self) -> IntrospectResult<Vec<RawTable>> {
        Ok(self.metadata.tables.clone())
    }

    async fn list_foreign_keys(&self) -> IntrospectResult<Vec<RawForeignKey>> {
        Ok(self.metadata.foreign_keys.clone())
    }
}
