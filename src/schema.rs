//! Schema extraction from a reference database.
//!
//! The first successfully downloaded source in a group defines the schema for
//! that group's merged database. Extraction reads `sqlite_master`, drops
//! everything the storage engine reserves for itself (`sqlite_*` names,
//! auto-indexes with NULL sql), and sorts by name so repeated merges produce
//! structurally identical output.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::value::quote_ident;

/// One table or index definition lifted from `sqlite_master`.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    pub name: String,
    pub create_sql: String,
}

/// Full extracted schema of a reference database.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub tables: Vec<SchemaObject>,
    pub indexes: Vec<SchemaObject>,
}

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub is_pk: bool,
}

/// Read table and index definitions from the database at `path`.
pub async fn extract_schema(path: &Path) -> Result<Schema> {
    let pool = db::open_ro(path).await?;
    let schema = extract_schema_from_pool(&pool).await;
    pool.close().await;
    schema
}

pub async fn extract_schema_from_pool(pool: &SqlitePool) -> Result<Schema> {
    let tables = master_objects(pool, "table").await?;
    let indexes = master_objects(pool, "index").await?;
    Ok(Schema { tables, indexes })
}

async fn master_objects(pool: &SqlitePool, kind: &str) -> Result<Vec<SchemaObject>> {
    let rows = sqlx::query(
        r#"
        SELECT name, sql FROM sqlite_master
        WHERE type = ? AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL
        ORDER BY name
        "#,
    )
    .bind(kind)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SchemaObject {
            name: row.get("name"),
            create_sql: row.get("sql"),
        })
        .collect())
}

/// Column metadata for `table`, in declaration order.
pub async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<ColumnInfo>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| ColumnInfo {
            name: row.get("name"),
            decl_type: row.get("type"),
            is_pk: row.get::<i64, _>("pk") > 0,
        })
        .collect())
}

/// Whether a table qualifies for surrogate-key reassignment: exactly one
/// primary-key column, literally named `id`, with integer affinity. Every
/// other key shape is copied verbatim by the merger.
pub fn surrogate_id_table(columns: &[ColumnInfo]) -> bool {
    let pk_cols: Vec<&ColumnInfo> = columns.iter().filter(|c| c.is_pk).collect();
    match pk_cols.as_slice() {
        [only] => only.name == "id" && only.decl_type.to_uppercase().contains("INT"),
        _ => false,
    }
}
