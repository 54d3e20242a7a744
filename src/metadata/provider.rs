//! SchemaIntrospector trait definition.
//!
//! The SchemaIntrospector trait abstracts over the ways of reading a
//! database catalog. The focused mapper assumes an introspector can be slow
//! (network round trips against large catalogs) and calls it at most once per
//! mapping run.

use async_trait::async_trait;

use super::types::{RawForeignKey, RawMetadata, RawTable};

/// Errors raised while reading a database catalog.
#[derive(Debug, thiserror::Error)]
pub enum IntrospectError {
    /// The database could not be reached or opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A catalog query failed.
    #[error("catalog query failed: {0}")]
    QueryFailed(String),

    /// A metadata snapshot file could not be read.
    #[error("failed to read snapshot {path}: {source}")]
    SnapshotRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A metadata snapshot file is not valid JSON metadata.
    #[error("invalid snapshot {path}: {source}")]
    SnapshotFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The blocking introspection task panicked or was cancelled.
    #[error("introspection task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for IntrospectError {
    fn from(err: rusqlite::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IntrospectError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type for introspection operations.
pub type IntrospectResult<T> = Result<T, IntrospectError>;

/// Trait for reading tables and foreign keys from a database.
///
/// Implementations normalize engine-specific rows into [`RawTable`] and
/// [`RawForeignKey`]. Table references in foreign keys use the same
/// qualified names as [`RawTable::qualified_name`].
///
/// # Example
///
/// ```ignore
/// use schemascope::metadata::{SchemaIntrospector, SchemaIntrospectorExt};
///
/// async fn example(introspector: &impl SchemaIntrospector) -> IntrospectResult<()> {
///     let tables = introspector.list_tables().await?;
///     let metadata = introspector.introspect().await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// List every table with its columns.
    async fn list_tables(&self) -> IntrospectResult<Vec<RawTable>>;

    /// List every foreign-key column pair.
    async fn list_foreign_keys(&self) -> IntrospectResult<Vec<RawForeignKey>>;
}

/// Extension trait with convenience methods for any introspector.
#[async_trait]
pub trait SchemaIntrospectorExt: SchemaIntrospector {
    /// Fetch tables and foreign keys concurrently, one call each.
    async fn introspect(&self) -> IntrospectResult<RawMetadata> {
        let (tables, foreign_keys) =
            futures::future::try_join(self.list_tables(), self.list_foreign_keys()).await?;

        tracing::debug!(
            tables = tables.len(),
            foreign_keys = foreign_keys.len(),
            "introspection complete"
        );

        Ok(RawMetadata {
            tables,
            foreign_keys,
        })
    }
}

// Blanket implementation for all SchemaIntrospector implementations
impl<T: SchemaIntrospector> SchemaIntrospectorExt for T {}
