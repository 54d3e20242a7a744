//! Error types surfaced by the focused mapper.

use crate::cache::CacheError;
use crate::config::{ConnectionError, SettingsError};
use crate::graph::{GraphBuildError, PathQueryError};
use crate::metadata::IntrospectError;

/// Invalid arguments or configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Empty pattern set: supply at least one non-blank table pattern")]
    EmptyPatternSet,

    #[error("Expansion depth {requested} exceeds the configured maximum of {max}")]
    DepthTooLarge { requested: usize, max: usize },

    #[error("max_results must be at least 1")]
    ZeroMaxResults,

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors returned by [`crate::mapper::FocusedMapper`].
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Introspection failed: {0}")]
    Connectivity(#[from] IntrospectError),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to fingerprint graph: {0}")]
    Fingerprint(serde_json::Error),
}

/// Coarse classification for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Connectivity,
    NotFound,
    Cache,
}

impl MapperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MapperError::Configuration(_) => ErrorKind::Configuration,
            MapperError::Connectivity(_) => ErrorKind::Connectivity,
            MapperError::UnknownTable(_) => ErrorKind::NotFound,
            MapperError::Cache(_) | MapperError::Fingerprint(_) => ErrorKind::Cache,
        }
    }
}

impl From<GraphBuildError> for MapperError {
    fn from(err: GraphBuildError) -> Self {
        match err {
            GraphBuildError::EmptyPatternSet => ConfigurationError::EmptyPatternSet.into(),
            GraphBuildError::Fingerprint(e) => MapperError::Fingerprint(e),
        }
    }
}

impl From<PathQueryError> for MapperError {
    fn from(err: PathQueryError) -> Self {
        match err {
            PathQueryError::UnknownTable(name) => MapperError::UnknownTable(name),
            PathQueryError::ZeroMaxResults => ConfigurationError::ZeroMaxResults.into(),
        }
    }
}

impl From<SettingsError> for MapperError {
    fn from(err: SettingsError) -> Self {
        ConfigurationError::Settings(err).into()
    }
}

pub type MapperResult<T> = Result<T, MapperError>;
