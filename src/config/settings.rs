//! TOML-based configuration for schemascope.
//!
//! Supports a config file (schemascope.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [connections.production]
//! driver = "postgres"
//! host = "db.internal"
//! database = "erp"
//! username = "${ERP_DB_USER}"
//! password = "${ERP_DB_PASSWORD}"
//!
//! [connections.local]
//! driver = "sqlite"
//! database = "./data/dev.db"
//!
//! [connections.erp_dump]
//! driver = "snapshot"
//! database = "./catalogs/erp.json"
//!
//! [cache]
//! path = "~/.schemascope/cache.db"
//! busy_timeout_ms = 5000
//!
//! [mapping]
//! patterns = ["workflow", "activity", "user"]
//! expansion_depth = 1
//! max_expansion_depth = 4
//!
//! [paths]
//! max_depth = 5
//! max_results = 10
//! shortest_only = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::connection::{ConnectionConfig, Driver};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Named database connections.
    pub connections: HashMap<String, ConnectionSettings>,

    /// Cache store configuration.
    pub cache: CacheSettings,

    /// Focused mapping defaults.
    pub mapping: MappingSettings,

    /// Path query defaults.
    pub paths: PathSettings,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Database engine (postgres, mysql, sqlite, snapshot).
    pub driver: String,

    /// Server hostname (supports ${ENV_VAR} expansion).
    #[serde(default)]
    pub host: String,

    /// Port, when not the engine default.
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name, or file path for SQLite and snapshots.
    pub database: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionSettings {
    /// Get the driver type.
    pub fn driver_type(&self) -> Result<Driver, SettingsError> {
        Driver::from_str(&self.driver)
            .map_err(|_| SettingsError::UnsupportedDriver(self.driver.clone()))
    }

    /// Resolve into a connection config with environment variables expanded.
    pub fn resolve(&self) -> Result<ConnectionConfig, SettingsError> {
        let expand_opt = |value: &Option<String>| -> Result<Option<String>, SettingsError> {
            value.as_deref().map(expand_env_vars).transpose()
        };

        Ok(ConnectionConfig {
            driver: self.driver_type()?,
            host: expand_env_vars(&self.host)?,
            database: expand_env_vars(&self.database)?,
            port: self.port,
            username: expand_opt(&self.username)?,
            password: expand_opt(&self.password)?,
        })
    }
}

/// Cache store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache database path. Defaults to `~/.schemascope/cache.db`.
    pub path: Option<String>,

    /// How long a writer waits for another process holding the write lock.
    pub busy_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl CacheSettings {
    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Resolve the configured path, expanding `~` and environment variables.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        let Some(raw) = &self.path else {
            return Ok(None);
        };
        let expanded = expand_env_vars(raw)?;
        if let Some(rest) = expanded.strip_prefix("~/") {
            let home = dirs::home_dir().ok_or_else(|| {
                SettingsError::InvalidConfig("cannot expand ~ without a home directory".to_string())
            })?;
            return Ok(Some(home.join(rest)));
        }
        Ok(Some(PathBuf::from(expanded)))
    }
}

/// Focused mapping defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingSettings {
    /// Patterns used when the caller supplies none.
    pub patterns: Vec<String>,

    /// Foreign-key hops followed from matched tables.
    pub expansion_depth: usize,

    /// Upper bound accepted for `expansion_depth`.
    pub max_expansion_depth: usize,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            patterns: ["pmact", "wf", "workflow", "activity", "process", "user"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            expansion_depth: 1,
            max_expansion_depth: 4,
        }
    }
}

/// Path query defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// Maximum hops in a returned path.
    pub max_depth: usize,

    /// Maximum number of paths returned.
    pub max_results: usize,

    /// Return only minimal-length paths.
    pub shortest_only: bool,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_results: 10,
            shortest_only: true,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SCHEMASCOPE_CONFIG`
    /// 2. `./schemascope.toml`
    /// 3. `~/.config/schemascope/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SCHEMASCOPE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("schemascope.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("schemascope").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Reject settings the mapper could never honor.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.mapping.expansion_depth > self.mapping.max_expansion_depth {
            return Err(SettingsError::InvalidConfig(format!(
                "mapping.expansion_depth ({}) exceeds mapping.max_expansion_depth ({})",
                self.mapping.expansion_depth, self.mapping.max_expansion_depth
            )));
        }
        if self.paths.max_results == 0 {
            return Err(SettingsError::InvalidConfig(
                "paths.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }

    /// Get the default connection ("default" if defined, else the first by name).
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        if let Some(conn) = self.connections.get("default") {
            return Some(("default", conn));
        }
        self.connections
            .iter()
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // A lone `$` is kept as-is.
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
