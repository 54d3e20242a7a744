//! Schema introspection module.
//!
//! This module defines the boundary between database engines and the focused
//! graph builder. Introspectors return normalized tables and foreign keys;
//! everything downstream works on those fixed shapes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SchemaIntrospector                         │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │  list_tables()        -> [RawTable { columns }]           │  │
//! │  │  list_foreign_keys()  -> [RawForeignKey]                  │  │
//! │  │  introspect()         -> RawMetadata (both, concurrently) │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                          │
//!          ▼                          ▼
//!   StaticIntrospector         SqliteIntrospector
//!   (snapshot JSON, memory)    (sqlite_master + pragmas)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use schemascope::metadata::{SchemaIntrospectorExt, SqliteIntrospector};
//!
//! let introspector = SqliteIntrospector::new("./data/app.db");
//! let metadata = introspector.introspect().await?;
//! ```

mod provider;
mod sqlite_provider;
mod static_provider;
mod types;

pub use provider::{IntrospectError, IntrospectResult, SchemaIntrospector, SchemaIntrospectorExt};
pub use sqlite_provider::SqliteIntrospector;
pub use static_provider::StaticIntrospector;
pub use types::*;
