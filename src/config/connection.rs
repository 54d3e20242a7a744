//! Database connection configuration.
//!
//! Supports configuration via environment variables:
//! - `SCHEMASCOPE_DB_DRIVER`: Database engine (postgres, mysql, sqlite, snapshot)
//! - `SCHEMASCOPE_DB_HOST`: Database server hostname (unused for SQLite)
//! - `SCHEMASCOPE_DB_NAME`: Database name (file path for SQLite and snapshots)
//! - `SCHEMASCOPE_DB_PORT`: Port (optional, uses driver default)

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Error type for connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported driver: {0}. Supported: postgres, mysql, sqlite, snapshot")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// PostgreSQL
    Postgres,
    /// MySQL / MariaDB
    MySql,
    /// SQLite (file database)
    Sqlite,
    /// JSON catalog snapshot captured from another database
    Snapshot,
}

impl Driver {
    /// Parse driver from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConnectionError> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "mysql" | "mariadb" => Ok(Driver::MySql),
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            "snapshot" | "json" => Ok(Driver::Snapshot),
            other => Err(ConnectionError::UnsupportedDriver(other.to_string())),
        }
    }

    /// Canonical driver name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
            Driver::MySql => "mysql",
            Driver::Sqlite => "sqlite",
            Driver::Snapshot => "snapshot",
        }
    }

    /// Get the default port for this driver.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Driver::Postgres => Some(5432),
            Driver::MySql => Some(3306),
            Driver::Sqlite | Driver::Snapshot => None,
        }
    }

    /// Whether `database` is a local file path rather than a server database.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Driver::Sqlite | Driver::Snapshot)
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The credential-free identity of a database.
///
/// Two connections with the same identity share mapping cache entries, so
/// this deliberately leaves out usernames and passwords.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    pub engine: Driver,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
}

impl ConnectionIdentity {
    /// Identity of a SQLite database file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::file(Driver::Sqlite, path)
    }

    /// Identity of a catalog snapshot file.
    pub fn snapshot(path: impl Into<String>) -> Self {
        Self::file(Driver::Snapshot, path)
    }

    fn file(engine: Driver, path: impl Into<String>) -> Self {
        Self {
            engine,
            host: String::new(),
            port: None,
            database: path.into(),
        }
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.engine, self.port) {
            (engine, _) if engine.is_file_based() => write!(f, "{}:{}", engine, self.database),
            (engine, Some(port)) => write!(f, "{}://{}:{}/{}", engine, self.host, port, self.database),
            (engine, None) => write!(f, "{}://{}/{}", engine, self.host, self.database),
        }
    }
}

/// Database connection configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Database engine.
    pub driver: Driver,
    /// Server hostname.
    pub host: String,
    /// Database name (file path for SQLite).
    pub database: String,
    /// Port (optional).
    pub port: Option<u16>,
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ConnectionConfig {
    /// Create a connection config for a server-based engine.
    pub fn server(
        driver: Driver,
        host: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            host: host.into(),
            database: database.into(),
            port: None,
            username: None,
            password: None,
        }
    }

    /// Create a connection config for a SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            driver: Driver::Sqlite,
            host: String::new(),
            database: path.into(),
            port: None,
            username: None,
            password: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SCHEMASCOPE_DB_DRIVER`: postgres, mysql or sqlite
    /// - `SCHEMASCOPE_DB_NAME`: Database name (or file path for SQLite)
    /// - `SCHEMASCOPE_DB_HOST`: Server hostname (not required for SQLite)
    ///
    /// Optional:
    /// - `SCHEMASCOPE_DB_PORT`: Server port
    /// - `SCHEMASCOPE_DB_USER`: Username
    /// - `SCHEMASCOPE_DB_PASSWORD`: Password
    pub fn from_env() -> Result<Self, ConnectionError> {
        let driver_str = env::var("SCHEMASCOPE_DB_DRIVER")
            .map_err(|_| ConnectionError::MissingEnvVar("SCHEMASCOPE_DB_DRIVER".to_string()))?;

        let driver = Driver::from_str(&driver_str)?;

        let database = env::var("SCHEMASCOPE_DB_NAME")
            .map_err(|_| ConnectionError::MissingEnvVar("SCHEMASCOPE_DB_NAME".to_string()))?;

        let host = match driver {
            Driver::Sqlite | Driver::Snapshot => env::var("SCHEMASCOPE_DB_HOST").unwrap_or_default(),
            Driver::Postgres | Driver::MySql => env::var("SCHEMASCOPE_DB_HOST")
                .map_err(|_| ConnectionError::MissingEnvVar("SCHEMASCOPE_DB_HOST".to_string()))?,
        };

        let port = match env::var("SCHEMASCOPE_DB_PORT") {
            Ok(p) => Some(p.parse().map_err(|_| {
                ConnectionError::InvalidConfig(format!("SCHEMASCOPE_DB_PORT is not a port: {}", p))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            driver,
            host,
            database,
            port,
            username: env::var("SCHEMASCOPE_DB_USER").ok(),
            password: env::var("SCHEMASCOPE_DB_PASSWORD").ok(),
        })
    }

    /// Credential-free identity used for cache fingerprints.
    ///
    /// The port falls back to the driver default so that an explicit
    /// `5432` and an omitted port fingerprint the same database.
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity {
            engine: self.driver,
            host: self.host.to_lowercase(),
            port: self.port.or_else(|| self.driver.default_port()),
            database: self.database.clone(),
        }
    }

    /// Get the driver name.
    pub fn driver_name(&self) -> &'static str {
        self.driver.as_str()
    }
}
