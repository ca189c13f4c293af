//! Schema-preserving merge of source databases into one output file.
//!
//! The merge rebuilds the output from scratch every cycle: apply the
//! reference schema, then copy rows table by table, source by source, in
//! declaration order. Tables with a lone integer `id` primary key get their
//! keys reassigned from a running counter so rows from overlapping sources
//! never collide; every other key shape is copied verbatim.
//!
//! Failures are contained at the smallest unit that can carry on: a bad
//! CREATE statement skips that table, a bad row skips that row, a source
//! file that won't open is dropped. Only failing to stand up the output
//! database itself fails the whole group.

use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db;
use crate::models::{MergeReport, TableMergeOutcome};
use crate::schema::{self, Schema};
use crate::value::{bind_value, quote_ident, SqlValue};

/// Whole-group merge failure. Anything below this level is counted in the
/// [`MergeReport`] instead.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to remove stale merged database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open merged database {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
}

/// Merge `sources` (in declaration order) into a fresh database at `output`.
pub async fn merge_group(
    schema: &Schema,
    sources: &[PathBuf],
    output: &Path,
) -> Result<MergeReport, MergeError> {
    remove_database_files(output)?;

    let out_pool = db::open_rw(output).await.map_err(|e| MergeError::Output {
        path: output.to_path_buf(),
        source: e,
    })?;

    let mut report = MergeReport::default();

    // Tables first; a table that fails to create is out for the whole merge.
    let mut live_tables: Vec<String> = Vec::new();
    for table in &schema.tables {
        match sqlx::query(&table.create_sql).execute(&out_pool).await {
            Ok(_) => {
                report.tables_created += 1;
                live_tables.push(table.name.clone());
            }
            Err(e) => {
                eprintln!("skipping table {}: {}", table.name, e);
                report.skipped_tables.push(table.name.clone());
            }
        }
    }

    // Indexing is best-effort, not load-critical.
    for index in &schema.indexes {
        match sqlx::query(&index.create_sql).execute(&out_pool).await {
            Ok(_) => report.indexes_created += 1,
            Err(e) => {
                eprintln!("skipping index {}: {}", index.name, e);
                report.skipped_indexes.push(index.name.clone());
            }
        }
    }

    // Open every source once. A file that won't open (truncated download,
    // not actually SQLite) is dropped from the merge.
    let mut source_pools: Vec<Option<SqlitePool>> = Vec::with_capacity(sources.len());
    for path in sources {
        match db::open_ro(path).await {
            Ok(pool) => source_pools.push(Some(pool)),
            Err(e) => {
                eprintln!("skipping source {}: {}", path.display(), e);
                report.skipped_sources.push(path.display().to_string());
                source_pools.push(None);
            }
        }
    }

    for table in &live_tables {
        match merge_table(&out_pool, &source_pools, table, &mut report).await {
            Ok(outcome) => report.per_table.push(outcome),
            Err(e) => {
                // Output-side introspection failed; record the table as lost.
                eprintln!("table {} dropped from merge: {}", table, e);
                report.per_table.push(TableMergeOutcome {
                    table: table.clone(),
                    rows: 0,
                    errors: 1,
                    id_reassigned: false,
                });
                report.row_errors += 1;
            }
        }
    }

    // Statistics refresh and storage reclaim; failure is logged, not fatal.
    if let Err(e) = sqlx::query("ANALYZE").execute(&out_pool).await {
        eprintln!("ANALYZE failed on {}: {}", output.display(), e);
    }
    if let Err(e) = sqlx::query("VACUUM").execute(&out_pool).await {
        eprintln!("VACUUM failed on {}: {}", output.display(), e);
    }

    for pool in source_pools.into_iter().flatten() {
        pool.close().await;
    }
    out_pool.close().await;

    Ok(report)
}

/// Copy one table from every open source into the output.
async fn merge_table(
    out_pool: &SqlitePool,
    source_pools: &[Option<SqlitePool>],
    table: &str,
    report: &mut MergeReport,
) -> anyhow::Result<TableMergeOutcome> {
    let columns = schema::table_columns(out_pool, table).await?;
    let reassign = schema::surrogate_id_table(&columns);
    let id_index = columns.iter().position(|c| c.name == "id");

    let column_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        column_list,
        placeholders
    );
    let select_sql = if reassign {
        // Deterministic scan order makes id reassignment reproducible.
        format!(
            "SELECT {} FROM {} ORDER BY \"id\"",
            column_list,
            quote_ident(table)
        )
    } else {
        format!("SELECT {} FROM {}", column_list, quote_ident(table))
    };

    let mut outcome = TableMergeOutcome {
        table: table.to_string(),
        rows: 0,
        errors: 0,
        id_reassigned: reassign,
    };

    // Counter seeded from whatever the output table already holds, so fresh
    // ids never collide with pre-merge ids.
    let mut next_id: i64 = if reassign {
        let max: Option<i64> =
            sqlx::query_scalar(&format!("SELECT MAX(\"id\") FROM {}", quote_ident(table)))
                .fetch_one(out_pool)
                .await?;
        max.unwrap_or(0) + 1
    } else {
        0
    };

    for pool in source_pools.iter().flatten() {
        let rows = match sqlx::query(&select_sql).fetch_all(pool).await {
            Ok(rows) => rows,
            Err(e) => {
                // Source missing this table or a column; the group invariant
                // only promises schema compatibility, it does not enforce it.
                eprintln!("cannot read table {} from a source: {}", table, e);
                outcome.errors += 1;
                report.row_errors += 1;
                continue;
            }
        };

        // One atomic batch per (table, source) pair.
        let mut tx = out_pool.begin().await?;
        for row in &rows {
            let mut values = match SqlValue::row_values(row) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("undecodable row in {}: {}", table, e);
                    outcome.errors += 1;
                    report.row_errors += 1;
                    continue;
                }
            };

            if reassign {
                if let Some(idx) = id_index {
                    values[idx] = SqlValue::Integer(next_id);
                }
                next_id += 1;
            }

            let mut query = sqlx::query(&insert_sql);
            for value in values {
                query = bind_value(query, value);
            }

            match query.execute(&mut *tx).await {
                Ok(_) => {
                    outcome.rows += 1;
                    report.rows_merged += 1;
                }
                Err(e) => {
                    eprintln!("row insert failed in {}: {}", table, e);
                    outcome.errors += 1;
                    report.row_errors += 1;
                }
            }
        }
        tx.commit().await?;
    }

    Ok(outcome)
}

/// Delete a database file plus its WAL/SHM siblings, tolerating absence.
pub fn remove_database_files(path: &Path) -> Result<(), MergeError> {
    for suffix in ["", "-wal", "-shm"] {
        let mut os = path.as_os_str().to_os_string();
        os.push(suffix);
        let target = PathBuf::from(os);
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MergeError::Io {
                    path: target,
                    source: e,
                })
            }
        }
    }
    Ok(())
}
