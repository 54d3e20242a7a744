//! SqliteIntrospector implementation.
//!
//! Reads the catalog of a SQLite database file through `sqlite_master` and
//! the `pragma_table_info` / `pragma_foreign_key_list` table-valued
//! functions. Blocking SQLite calls run on tokio's blocking pool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};

use super::provider::{IntrospectError, IntrospectResult, SchemaIntrospector};
use super::types::{RawColumn, RawForeignKey, RawTable};
use crate::config::ConnectionIdentity;

/// SchemaIntrospector for a SQLite database file.
///
/// SQLite has no schemas, so table identities are bare table names. SQLite
/// does not name foreign-key constraints either; constraints are reported as
/// `fk_<table>_<id>` using the pragma's constraint id.
#[derive(Debug, Clone)]
pub struct SqliteIntrospector {
    path: PathBuf,
}

impl SqliteIntrospector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity of the inspected database for cache fingerprints.
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity::sqlite(self.path.display().to_string())
    }

    fn open(path: &Path) -> IntrospectResult<Connection> {
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| IntrospectError::ConnectionFailed(format!("{}: {}", path.display(), e)))
    }

    fn table_names(conn: &Connection) -> IntrospectResult<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn read_columns(conn: &Connection, table: &str) -> IntrospectResult<Vec<RawColumn>> {
        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map(params![table], |row| {
                let not_null: i64 = row.get(2)?;
                let pk: i64 = row.get(3)?;
                Ok(RawColumn {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: not_null == 0 && pk == 0,
                    primary_key: pk > 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn primary_key_columns(conn: &Connection, table: &str) -> IntrospectResult<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
        let names = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn read_tables(path: &Path) -> IntrospectResult<Vec<RawTable>> {
        let conn = Self::open(path)?;
        let mut tables = Vec::new();
        for name in Self::table_names(&conn)? {
            let columns = Self::read_columns(&conn, &name)?;
            tables.push(RawTable {
                schema: None,
                name,
                columns,
            });
        }
        Ok(tables)
    }

    fn read_foreign_keys(path: &Path) -> IntrospectResult<Vec<RawForeignKey>> {
        let conn = Self::open(path)?;
        let mut foreign_keys = Vec::new();

        for table in Self::table_names(&conn)? {
            let mut stmt = conn.prepare(
                "SELECT id, seq, \"table\", \"from\", \"to\"
                 FROM pragma_foreign_key_list(?1)
                 ORDER BY id, seq",
            )?;
            let rows = stmt
                .query_map(params![&table], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for (id, seq, target, from_column, to_column) in rows {
                // A NULL target column means the FK references the target's primary key.
                let to_column = match to_column {
                    Some(column) => column,
                    None => Self::primary_key_columns(&conn, &target)?
                        .into_iter()
                        .nth(usize::try_from(seq).unwrap_or(0))
                        .unwrap_or_else(|| "rowid".to_string()),
                };

                foreign_keys.push(RawForeignKey {
                    from_table: table.clone(),
                    from_column,
                    to_table: target,
                    to_column,
                    constraint_name: Some(format!("fk_{}_{}", table, id)),
                });
            }
        }

        Ok(foreign_keys)
    }
}

#[async_trait]
impl SchemaIntrospector for SqliteIntrospector {
    async fn list_tables(&self) -> IntrospectResult<Vec<RawTable>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_tables(&path)).await?
    }

    async fn list_foreign_keys(&self) -> IntrospectResult<Vec<RawForeignKey>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_foreign_keys(&path)).await?
    }
}
