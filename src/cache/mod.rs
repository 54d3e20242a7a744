//! SQLite-backed cache for mapping graphs and path results.
//!
//! Building a focused graph costs a full catalog introspection, and path
//! enumeration over a dense graph is not free either, so both are persisted
//! in `~/.schemascope/cache.db` and shared by every session on the machine.
//!
//! # Design
//!
//! - One table per [`Namespace`], rows keyed by a SHA-256 fingerprint of the
//!   canonical key fields
//! - Key fields are stored next to the payload and re-hashed on read; a
//!   mismatch or an undecodable payload drops the row and reads as a miss
//! - No TTL - entries persist until invalidated or replaced
//! - Versioned - auto-clears on version mismatch
//! - WAL journal plus `IMMEDIATE` write transactions for multi-process use
//!
//! # Layout
//!
//! ```text
//! mapping_entries  fingerprint | key_json | payload | created_at | graph
//! path_entries     fingerprint | key_json | payload | created_at | graph
//! meta             key | value                       ('version' -> "1")
//! ```
//!
//! `graph` is the content fingerprint of the graph a row belongs to: the
//! stored graph itself for mapping rows, the graph the paths were computed
//! over for path rows. Replacing or invalidating a mapping row deletes the
//! path rows owned by the graph it held.

mod hash;
mod mapping_cache;
mod path_cache;

pub use hash::{compute_hash, hash_json};
pub use mapping_cache::{MappingCache, MappingKey, MappingSummary};
pub use path_cache::{PathCache, PathKey};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Current cache schema version. Bump this when the cache format changes.
const CACHE_VERSION: i32 = 1;

/// Busy timeout used when no configuration is supplied.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted {namespace} cache entry {fingerprint}: {reason}")]
    Corrupted {
        namespace: Namespace,
        fingerprint: String,
        reason: String,
    },

    #[error("Cache connection lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Age of an entry created at `created_at`, clamped at zero.
fn age_since(created_at: i64) -> Duration {
    Duration::from_secs(unix_now().saturating_sub(created_at).max(0) as u64)
}

/// The two independent cache namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Built mapping graphs.
    Mapping,
    /// Path query results.
    Path,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Mapping, Namespace::Path];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Mapping => "mapping",
            Namespace::Path => "path",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Namespace::Mapping => "mapping_entries",
            Namespace::Path => "path_entries",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache statistics for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries in the namespace.
    pub entry_count: usize,
    /// Total size of all payloads in bytes.
    pub total_size_bytes: usize,
    /// Age of the oldest entry, `None` when empty.
    pub oldest_entry_age: Option<Duration>,
}

/// One raw row, as read by the typed views.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub fingerprint: String,
    pub key_json: String,
    pub payload: String,
    pub created_at: i64,
}

/// SQLite-based cache store shared by the mapping and path namespaces.
///
/// The connection sits behind a `Mutex` so one store can be shared across
/// sessions as `Arc<CacheStore>`. Cross-process writers are serialized by
/// SQLite itself (WAL + busy timeout + immediate transactions).
pub struct CacheStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Open or create the cache database at `path`.
    ///
    /// A file that exists but is not a SQLite database is deleted and
    /// recreated. If the cache version doesn't match, it's automatically
    /// cleared.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> CacheResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = match Self::open_file(path, busy_timeout) {
            Ok(conn) => conn,
            Err(CacheError::Sqlite(err)) if is_unusable_file(&err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "cache file is not a usable database, recreating"
                );
                remove_database_files(path)?;
                Self::open_file(path, busy_timeout)?
            }
            Err(err) => return Err(err),
        };

        debug!(path = %path.display(), "cache store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open the cache at its default location, `~/.schemascope/cache.db`.
    pub fn open_default() -> CacheResult<Self> {
        Self::open(Self::cache_path()?, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Get the default path of the cache database.
    pub fn cache_path() -> CacheResult<PathBuf> {
        let base = dirs::home_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join(".schemascope").join("cache.db"))
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Typed view over the mapping namespace.
    pub fn mappings(&self) -> MappingCache<'_> {
        MappingCache::new(self)
    }

    /// Typed view over the path namespace.
    pub fn paths(&self) -> PathCache<'_> {
        PathCache::new(self)
    }

    fn open_file(path: &Path, busy_timeout: Duration) -> CacheResult<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(&conn)?;
        Ok(conn)
    }

    fn connection(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))
    }

    /// Initialize the cache schema and check version.
    fn init(conn: &Connection) -> CacheResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS mapping_entries (
                fingerprint TEXT PRIMARY KEY,
                key_json TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                graph TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS path_entries (
                fingerprint TEXT PRIMARY KEY,
                key_json TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                graph TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_path_entries_graph ON path_entries (graph);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            Some(v) => {
                info!(
                    found = v,
                    expected = CACHE_VERSION,
                    "cache version mismatch, clearing entries"
                );
                for namespace in Namespace::ALL {
                    conn.execute(&format!("DELETE FROM {}", namespace.table()), [])?;
                }
                Self::set_version(conn)?;
            }
            None => Self::set_version(conn)?,
        }

        Ok(())
    }

    fn set_version(conn: &Connection) -> CacheResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?1)",
            params![CACHE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Get the entry stored under `fingerprint`.
    ///
    /// A row whose key fields no longer hash to its fingerprint, or whose
    /// payload does not decode as `V`, is deleted and reported as a miss.
    pub fn get<V: DeserializeOwned>(
        &self,
        namespace: Namespace,
        fingerprint: &str,
    ) -> CacheResult<Option<V>> {
        let row: Option<(String, String)> = {
            let conn = self.connection()?;
            conn.query_row(
                &format!(
                    "SELECT key_json, payload FROM {} WHERE fingerprint = ?1",
                    namespace.table()
                ),
                params![fingerprint],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        let Some((key_json, payload)) = row else {
            return Ok(None);
        };

        let decoded = if hash_json(&key_json) != fingerprint {
            Err("key fields do not match the fingerprint".to_string())
        } else {
            serde_json::from_str::<V>(&payload).map_err(|e| e.to_string())
        };

        match decoded {
            Ok(value) => Ok(Some(value)),
            Err(reason) => {
                let err = CacheError::Corrupted {
                    namespace,
                    fingerprint: fingerprint.to_string(),
                    reason,
                };
                warn!(error = %err, "dropping corrupted cache entry");
                if let Err(e) = self.invalidate(namespace, fingerprint) {
                    warn!(%namespace, %fingerprint, error = %e, "failed to drop corrupted cache entry");
                }
                Ok(None)
            }
        }
    }

    /// Store `value` under the fingerprint of `key`, replacing any existing
    /// entry. `graph` is the content fingerprint the entry belongs to.
    ///
    /// Returns the entry's fingerprint.
    pub fn put<K: Serialize, V: Serialize>(
        &self,
        namespace: Namespace,
        key: &K,
        value: &V,
        graph: &str,
    ) -> CacheResult<String> {
        let key_json = serde_json::to_string(key)?;
        let payload = serde_json::to_string(value)?;
        let fingerprint = hash_json(&key_json);

        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if namespace == Namespace::Mapping {
            // Paths over the same graph content stay valid.
            let dropped = tx.execute(
                "DELETE FROM path_entries WHERE graph IN
                    (SELECT graph FROM mapping_entries WHERE fingerprint = ?1 AND graph != ?2)",
                params![fingerprint, graph],
            )?;
            if dropped > 0 {
                debug!(dropped, "dropped path entries of replaced graph");
            }
        }

        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (fingerprint, key_json, payload, created_at, graph)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                namespace.table()
            ),
            params![fingerprint, key_json, payload, unix_now(), graph],
        )?;
        tx.commit()?;

        debug!(%namespace, %fingerprint, bytes = payload.len(), "cache entry stored");
        Ok(fingerprint)
    }

    /// Delete one entry. Returns true if an entry was deleted.
    pub fn invalidate(&self, namespace: Namespace, fingerprint: &str) -> CacheResult<bool> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if namespace == Namespace::Mapping {
            tx.execute(
                "DELETE FROM path_entries WHERE graph IN
                    (SELECT graph FROM mapping_entries WHERE fingerprint = ?1)",
                params![fingerprint],
            )?;
        }
        let rows = tx.execute(
            &format!("DELETE FROM {} WHERE fingerprint = ?1", namespace.table()),
            params![fingerprint],
        )?;
        tx.commit()?;

        Ok(rows > 0)
    }

    /// Delete every entry of a namespace. Returns the number deleted.
    pub fn clear(&self, namespace: Namespace) -> CacheResult<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if namespace == Namespace::Mapping {
            tx.execute(
                "DELETE FROM path_entries WHERE graph IN (SELECT graph FROM mapping_entries)",
                [],
            )?;
        }
        let rows = tx.execute(&format!("DELETE FROM {}", namespace.table()), [])?;
        tx.commit()?;

        info!(%namespace, removed = rows, "cache namespace cleared");
        Ok(rows)
    }

    /// Get statistics for one namespace.
    pub fn stats(&self, namespace: Namespace) -> CacheResult<CacheStats> {
        let conn = self.connection()?;
        let (entry_count, total_size, oldest): (i64, i64, Option<i64>) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(payload)), 0), MIN(created_at) FROM {}",
                namespace.table()
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(CacheStats {
            entry_count: entry_count as usize,
            total_size_bytes: total_size as usize,
            oldest_entry_age: oldest.map(age_since),
        })
    }

    /// All rows of a namespace, newest first.
    pub(crate) fn rows(&self, namespace: Namespace) -> CacheResult<Vec<StoredRow>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT fingerprint, key_json, payload, created_at FROM {}
             ORDER BY created_at DESC, fingerprint",
            namespace.table()
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredRow {
                    fingerprint: row.get(0)?,
                    key_json: row.get(1)?,
                    payload: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Overwrite a stored payload without touching its key fields.
    #[cfg(test)]
    fn corrupt_payload(&self, namespace: Namespace, fingerprint: &str, payload: &str) {
        let conn = self.connection().unwrap();
        conn.execute(
            &format!(
                "UPDATE {} SET payload = ?1 WHERE fingerprint = ?2",
                namespace.table()
            ),
            params![payload, fingerprint],
        )
        .unwrap();
    }
}

fn is_unusable_file(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::NotADatabase || e.code == ErrorCode::DatabaseCorrupt
    )
}

fn remove_database_files(path: &Path) -> CacheResult<()> {
    std::fs::remove_file(path)?;
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
