//! Owned SQLite values for moving rows between databases.
//!
//! The merger and the query layer both handle rows of unknown shape: the
//! schema comes from whatever the first source database declares. [`SqlValue`]
//! captures a cell in one of SQLite's five storage classes so it can be
//! decoded from one connection, re-bound on another, or rendered as JSON.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sqlx::decode::Decode;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};

/// One cell, in SQLite storage-class terms.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Decode the cell at `index` from a dynamically-typed row.
    ///
    /// Decoding goes by the value's storage class, not the declared column
    /// type, so heterogeneous source data (e.g. an INTEGER stored in a TEXT
    /// column) survives the round trip.
    pub fn from_row(row: &SqliteRow, index: usize) -> Result<SqlValue> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }

        let type_name = raw.type_info().name().to_string();
        let value = match type_name.as_str() {
            "INTEGER" | "BIGINT" | "INT" | "INT4" | "INT8" | "BOOLEAN" => SqlValue::Integer(
                <i64 as Decode<Sqlite>>::decode(raw).map_err(|e| anyhow::anyhow!("{e}"))?,
            ),
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => SqlValue::Real(
                <f64 as Decode<Sqlite>>::decode(raw).map_err(|e| anyhow::anyhow!("{e}"))?,
            ),
            "TEXT" | "DATETIME" | "DATE" | "TIME" => SqlValue::Text(
                <String as Decode<Sqlite>>::decode(raw).map_err(|e| anyhow::anyhow!("{e}"))?,
            ),
            _ => SqlValue::Blob(
                <Vec<u8> as Decode<Sqlite>>::decode(raw).map_err(|e| anyhow::anyhow!("{e}"))?,
            ),
        };
        Ok(value)
    }

    /// Decode every cell of a row, in column order.
    pub fn row_values(row: &SqliteRow) -> Result<Vec<SqlValue>> {
        (0..row.len()).map(|i| SqlValue::from_row(row, i)).collect()
    }

    /// Render as JSON. Blobs become base64 strings; non-finite reals become
    /// null (JSON has no NaN/Infinity).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(i) => serde_json::json!(i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlValue::Text(s) => serde_json::Value::String(s.clone()),
            SqlValue::Blob(b) => serde_json::Value::String(BASE64.encode(b)),
        }
    }
}

/// Bind an owned value onto a query, preserving its storage class.
pub fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<i64>),
        SqlValue::Integer(i) => query.bind(i),
        SqlValue::Real(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
    }
}

/// Quote an identifier for embedding in SQL text.
///
/// Table and column names come from downloaded databases and cannot be bound
/// as parameters, so they are double-quoted with embedded quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
