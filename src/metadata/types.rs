//! Normalized raw metadata shapes.
//!
//! Every introspector converts its engine-specific catalog rows into these
//! types, so nothing past this boundary branches on the database engine.

use serde::{Deserialize, Serialize};

/// Join a schema and table name into the qualified identity used everywhere.
pub fn qualify(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) if !schema.is_empty() => format!("{}.{}", schema, name),
        _ => name.to_string(),
    }
}

fn default_nullable() -> bool {
    true
}

/// Column information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    /// Column name.
    pub name: String,
    /// Declared type as reported by the engine.
    #[serde(default)]
    pub data_type: String,
    /// Whether NULL values are allowed.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Whether this column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
        }
    }

    /// Mark the column as a non-null primary key column.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A table and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    /// Schema the table belongs to (absent for schema-less engines).
    #[serde(default)]
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    #[serde(default)]
    pub columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_column(mut self, column: RawColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Schema-qualified name (`schema.table`, or `table` without a schema).
    pub fn qualified_name(&self) -> String {
        qualify(self.schema.as_deref(), &self.name)
    }
}

/// One column pair of a foreign-key constraint.
///
/// Composite constraints are reported as one entry per column pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawForeignKey {
    /// Qualified name of the referencing table.
    pub from_table: String,
    pub from_column: String,
    /// Qualified name of the referenced table.
    pub to_table: String,
    pub to_column: String,
    /// Constraint name, when the engine exposes one.
    #[serde(default)]
    pub constraint_name: Option<String>,
}

impl RawForeignKey {
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
            constraint_name: None,
        }
    }

    pub fn named(mut self, constraint_name: impl Into<String>) -> Self {
        self.constraint_name = Some(constraint_name.into());
        self
    }
}

/// Everything one introspection pass returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub tables: Vec<RawTable>,
    #[serde(default)]
    pub foreign_keys: Vec<RawForeignKey>,
}

impl RawMetadata {
    pub fn new(tables: Vec<RawTable>, foreign_keys: Vec<RawForeignKey>) -> Self {
        Self {
            tables,
            foreign_keys,
        }
    }
}
