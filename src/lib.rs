//! # Schemascope
//!
//! Focused relationship mapping for relational databases.
//!
//! ## Architecture
//!
//! Instead of mapping an entire catalog, schemascope restricts the
//! table/foreign-key graph to tables whose names match a few patterns, plus
//! their neighbors within a bounded number of hops, and answers "how are
//! these two tables connected" questions inside that restricted graph:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │             SchemaIntrospector (metadata)               │
//! │     (snapshot JSON, SQLite catalog, custom engines)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [graph::builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │      MappingGraph (pattern match + FK closure)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [graph::query]
//! ┌─────────────────────────────────────────────────────────┐
//! │         PathResult (BFS over undirected FKs)            │
//! └─────────────────────────────────────────────────────────┘
//!
//!     both stages persisted by [cache] (SQLite, two namespaces),
//!     orchestrated by [mapper::FocusedMapper]
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod mapper;
pub mod metadata;

pub use cache::{CacheStore, Namespace};
pub use error::{ConfigurationError, ErrorKind, MapperError, MapperResult};
pub use graph::{MappingGraph, PathQuery, PathResult};
pub use mapper::{CacheStatsReport, FocusedMapper, InvalidateTarget, MapperSettings};
