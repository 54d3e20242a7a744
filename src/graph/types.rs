//! Type definitions for the focused mapping graph.
//!
//! Nodes are tables, edges are foreign-key column pairs. Everything here is
//! serializable because whole graphs are persisted in the mapping cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::builder::{GraphBuildError, GraphBuildResult};
use crate::metadata::{RawColumn, RawForeignKey};

// ============================================================================
// Patterns
// ============================================================================

/// Ordered, case-insensitive table-name substrings.
///
/// Matching is literal containment: `user` matches `user_account` and also
/// `superuser_log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TablePatterns(Vec<String>);

impl TablePatterns {
    /// Collect patterns, trimming whitespace and dropping blanks.
    ///
    /// Fails with [`GraphBuildError::EmptyPatternSet`] when nothing remains.
    pub fn new<I, S>(patterns: I) -> GraphBuildResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        if patterns.is_empty() {
            return Err(GraphBuildError::EmptyPatternSet);
        }
        Ok(Self(patterns))
    }

    /// Patterns in the order the user supplied them.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Lower-cased, sorted, de-duplicated form used for fingerprints.
    pub fn canonical(&self) -> Vec<String> {
        let mut canonical: Vec<String> = self.0.iter().map(|p| p.to_lowercase()).collect();
        canonical.sort();
        canonical.dedup();
        canonical
    }

    /// Whether any pattern is a case-insensitive substring of `table_name`.
    pub fn matches(&self, table_name: &str) -> bool {
        let name = table_name.to_lowercase();
        self.0.iter().any(|p| name.contains(&p.to_lowercase()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TablePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

// ============================================================================
// Node Types
// ============================================================================

/// Column of a mapped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as reported by the engine.
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl From<&RawColumn> for ColumnInfo {
    fn from(column: &RawColumn) -> Self {
        Self {
            name: column.name.clone(),
            data_type: column.data_type.clone(),
            nullable: column.nullable,
            primary_key: column.primary_key,
        }
    }
}

/// How a table entered the mapping graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOrigin {
    /// The table name matched one of the patterns.
    Matched,
    /// Reached only through the foreign-key closure.
    Expansion,
}

/// Table node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNode {
    /// Schema-qualified table name.
    pub name: String,
    /// Columns in ordinal order. Empty for tables that were only seen as
    /// foreign-key targets.
    pub columns: Vec<ColumnInfo>,
    pub origin: NodeOrigin,
    /// Foreign-key hops from the nearest matched table (0 when matched).
    pub hops: usize,
}

impl TableNode {
    pub fn matched_by_pattern(&self) -> bool {
        self.origin == NodeOrigin::Matched
    }

    pub fn included_by_expansion(&self) -> bool {
        self.origin == NodeOrigin::Expansion
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

// ============================================================================
// Edge Types
// ============================================================================

/// One foreign-key column pair, recorded in constraint direction.
///
/// The derived ordering (source table, source column, target table, target
/// column, constraint) is the lexical order used for path tie-breaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    #[serde(default)]
    pub constraint_name: Option<String>,
}

impl RelationshipEdge {
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            source_column: source_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
            constraint_name: None,
        }
    }

    pub(crate) fn from_raw(fk: &RawForeignKey, source_table: &str, target_table: &str) -> Self {
        Self {
            source_table: source_table.to_string(),
            source_column: fk.from_column.clone(),
            target_table: target_table.to_string(),
            target_column: fk.to_column.clone(),
            constraint_name: fk.constraint_name.clone(),
        }
    }

    /// Whether the edge touches `table` at either end.
    pub fn touches(&self, table: &str) -> bool {
        self.source_table == table || self.target_table == table
    }

    /// Whether the edge joins `a` and `b`, in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_table == a && self.target_table == b)
            || (self.source_table == b && self.target_table == a)
    }

    pub fn is_self_reference(&self) -> bool {
        self.source_table == self.target_table
    }
}

impl fmt::Display for RelationshipEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source_table, self.source_column, self.target_table, self.target_column
        )
    }
}

/// Non-fatal conditions reported alongside a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingWarning {
    /// No table name contained any pattern; the graph is empty.
    NoTablesMatched,
}

impl fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingWarning::NoTablesMatched => {
                f.write_str("no tables matched the patterns; try broader patterns")
            }
        }
    }
}
