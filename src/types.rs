//! Type definitions for guarded database operations

use serde::Serialize;
use std::borrow::Cow;

/// A single SQL value, used both for bound parameters and decoded columns
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Render as an SQL literal, or `None` when there is no textual form
    fn to_literal(&self) -> Option<String> {
        match self {
            Self::Null => Some("NULL".to_string()),
            Self::Bool(true) => Some("TRUE".to_string()),
            Self::Bool(false) => Some("FALSE".to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) if v.is_finite() => Some(v.to_string()),
            Self::Float(_) => None,
            Self::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
            Self::Blob(_) => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

/// Piece of a driver-composed query
#[derive(Debug, Clone, PartialEq)]
pub enum SqlFragment {
    /// Raw SQL, emitted verbatim
    Sql(String),
    /// Identifier, emitted double-quoted
    Identifier(String),
    /// Value, emitted as an SQL literal
    Literal(SqlValue),
}

/// A statement as handed to the execution layer
///
/// Not every statement object carries text directly. [`Statement::as_sql`]
/// coerces to text where possible; callers that need a decision on a
/// statement with no textual form must treat it as unknown.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Text(String),
    Composed(Vec<SqlFragment>),
    Bytes(Vec<u8>),
}

impl Statement {
    /// Build a composed statement from fragments
    pub fn composed(fragments: impl IntoIterator<Item = SqlFragment>) -> Self {
        Self::Composed(fragments.into_iter().collect())
    }

    /// Coerce to SQL text
    ///
    /// Returns `None` for bytes that are not UTF-8 and for composed queries
    /// holding a literal with no textual form (blobs, non-finite floats).
    ///
    /// # Examples
    /// ```
    /// # use sql_read_only::types::{SqlFragment, Statement};
    /// let stmt = Statement::composed([
    ///     SqlFragment::Sql("SELECT * FROM ".to_string()),
    ///     SqlFragment::Identifier("site".to_string()),
    /// ]);
    /// assert_eq!(stmt.as_sql().as_deref(), Some("SELECT * FROM \"site\""));
    ///
    /// assert!(Statement::Bytes(vec![0xff, 0xfe]).as_sql().is_none());
    /// ```
    pub fn as_sql(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(sql) => Some(Cow::Borrowed(sql.as_str())),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Self::Composed(fragments) => {
                let mut sql = String::new();
                for fragment in fragments {
                    match fragment {
                        SqlFragment::Sql(raw) => sql.push_str(raw),
                        SqlFragment::Identifier(name) => {
                            sql.push('"');
                            sql.push_str(&name.replace('"', "\"\""));
                            sql.push('"');
                        }
                        SqlFragment::Literal(value) => sql.push_str(&value.to_literal()?),
                    }
                }
                Some(Cow::Owned(sql))
            }
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::Text(sql.to_string())
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::Text(sql)
    }
}

impl From<Vec<u8>> for Statement {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// SQL execution result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names of the returned rows (empty when no rows came back)
    pub columns: Vec<String>,

    /// Result rows, one value per column
    pub rows: Vec<Vec<SqlValue>>,

    /// Rows changed by batch execution
    pub rows_affected: u64,
}

impl QueryResult {
    /// First column of the first row, if any
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Database type, detected from the connection URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    Postgres,
    MySQL,
    MariaDB,
    SQLite,
}

impl DatabaseType {
    /// Detect database type from connection URL scheme
    ///
    /// # Examples
    /// ```
    /// # use sql_read_only::types::DatabaseType;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = DatabaseType::from_url("postgres://localhost/mydb")?;
    /// assert_eq!(db, DatabaseType::Postgres);
    /// assert_eq!(DatabaseType::from_url("sqlite::memory:")?, DatabaseType::SQLite);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_url(url: &str) -> Result<Self, crate::error::DatabaseError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("mysql://") {
            Ok(Self::MySQL)
        } else if url.starts_with("mariadb://") {
            Ok(Self::MariaDB)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") {
            Ok(Self::SQLite)
        } else {
            // Never echo the URL back: it may carry a password.
            Err(crate::error::DatabaseError::UnsupportedDatabase(
                "Cannot determine database type from URL scheme".to_string(),
            ))
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::MySQL => write!(f, "MySQL"),
            Self::MariaDB => write!(f, "MariaDB"),
            Self::SQLite => write!(f, "SQLite"),
        }
    }
}
