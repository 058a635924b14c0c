//! Row conversion for SQL results
//!
//! Converts sqlx AnyRow instances to [`SqlValue`] rows.

use crate::error::DatabaseError;
use crate::types::{QueryResult, SqlValue};
use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};

/// Convert a sqlx Row to one value per column
///
/// # Errors
/// Returns error if a column cannot be decoded as its reported type
pub fn row_to_values(row: &AnyRow) -> Result<Vec<SqlValue>, DatabaseError> {
    let mut values = Vec::with_capacity(row.columns().len());

    for column in row.columns() {
        let ordinal = column.ordinal();
        let name = column.name();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOLEAN" => match row.try_get::<Option<bool>, _>(ordinal) {
                Ok(Some(b)) => SqlValue::Bool(b),
                Ok(None) => SqlValue::Null,
                Err(e) => return Err(decode_error(name, type_name, e)),
            },
            "SMALLINT" | "INTEGER" | "BIGINT" => match row.try_get::<Option<i64>, _>(ordinal) {
                Ok(Some(v)) => SqlValue::Int(v),
                Ok(None) => SqlValue::Null,
                Err(e) => return Err(decode_error(name, type_name, e)),
            },
            "REAL" | "DOUBLE" => match row.try_get::<Option<f64>, _>(ordinal) {
                Ok(Some(v)) => SqlValue::Float(v),
                Ok(None) => SqlValue::Null,
                Err(e) => return Err(decode_error(name, type_name, e)),
            },
            "TEXT" => match row.try_get::<Option<String>, _>(ordinal) {
                Ok(Some(s)) => SqlValue::Text(s),
                Ok(None) => SqlValue::Null,
                Err(e) => return Err(decode_error(name, type_name, e)),
            },
            "BLOB" => match row.try_get::<Option<Vec<u8>>, _>(ordinal) {
                Ok(Some(bytes)) => SqlValue::Blob(bytes),
                Ok(None) => SqlValue::Null,
                Err(e) => return Err(decode_error(name, type_name, e)),
            },
            // Expression columns in SQLite often report no declared type;
            // probe the value itself.
            _ => probe(row, ordinal),
        };

        values.push(value);
    }

    Ok(values)
}

fn probe(row: &AnyRow, ordinal: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(ordinal) {
        return v.map(SqlValue::Int).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(ordinal) {
        return v.map(SqlValue::Float).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(ordinal) {
        return v.map(SqlValue::Text).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(ordinal) {
        return v.map(SqlValue::Blob).unwrap_or(SqlValue::Null);
    }
    SqlValue::Null
}

fn decode_error(name: &str, type_name: &str, e: sqlx::Error) -> DatabaseError {
    DatabaseError::QueryError(format!(
        "Failed to extract column '{}' as {}: {}",
        name, type_name, e
    ))
}

/// Build a [`QueryResult`] from fetched rows
pub fn rows_to_result(rows: &[AnyRow]) -> Result<QueryResult, DatabaseError> {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect()
        })
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(row_to_values)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult {
        columns,
        rows,
        rows_affected: 0,
    })
}
