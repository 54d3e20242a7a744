//! Configuration module for schemascope.
//!
//! Handles connection configuration, environment variables, and settings.

mod connection;
mod settings;

pub use connection::{ConnectionConfig, ConnectionError, ConnectionIdentity, Driver};
pub use settings::{
    expand_env_vars, CacheSettings, ConnectionSettings, MappingSettings, PathSettings, Settings,
    SettingsError,
};
