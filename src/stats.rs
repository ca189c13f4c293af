//! Per-group database statistics.
//!
//! Backs the `/api/<group>/stats` endpoints: table names, row counts, file
//! size, last-modified time, and how many sources fed the current merge.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::live::GroupHandle;
use crate::models::{GroupStats, TableCount};
use crate::value::quote_ident;

pub async fn group_stats(handle: &GroupHandle) -> Result<GroupStats> {
    let table_names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&handle.pool)
    .await?;

    let mut tables = Vec::with_capacity(table_names.len());
    let mut total_rows = 0i64;
    for name in table_names {
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)))
            .fetch_one(&handle.pool)
            .await?;
        total_rows += rows;
        tables.push(TableCount { table: name, rows });
    }

    let metadata = std::fs::metadata(&handle.path).ok();
    let file_size_bytes = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
    let last_modified = metadata
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);

    Ok(GroupStats {
        group: handle.group.clone(),
        tables,
        total_rows,
        file_size_bytes,
        last_modified,
        source_count: handle.source_count,
    })
}
