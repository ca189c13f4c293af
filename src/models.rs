//! Core data models for the download-merge-serve pipeline.
//!
//! These types flow between the fetcher, the merger, the refresh scheduler,
//! and the HTTP layer. Reports are plain serializable data so tests and API
//! consumers can assert on counts instead of log output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::fetch::FetchError;

/// One remote database to download during a refresh cycle.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub url: String,
    pub group: String,
    /// Scratch path the file is downloaded to. Deleted after the merge.
    pub local_path: PathBuf,
}

/// Outcome of fetching one [`SourceDescriptor`]. Consumed immediately by the
/// merger; never persisted.
#[derive(Debug)]
pub struct DownloadResult {
    pub descriptor: SourceDescriptor,
    pub outcome: Result<(), FetchError>,
}

impl DownloadResult {
    pub fn ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-table outcome of one group merge.
#[derive(Debug, Clone, Serialize)]
pub struct TableMergeOutcome {
    pub table: String,
    pub rows: u64,
    pub errors: u64,
    /// Whether the surrogate-id reassignment path was taken for this table.
    pub id_reassigned: bool,
}

/// Aggregate report for one group merge.
#[derive(Debug, Clone, Serialize, Default)]
pub struct MergeReport {
    pub tables_created: u64,
    pub indexes_created: u64,
    pub rows_merged: u64,
    pub row_errors: u64,
    pub per_table: Vec<TableMergeOutcome>,
    /// Tables whose CREATE statement failed; excluded from the row merge.
    pub skipped_tables: Vec<String>,
    /// Indexes whose CREATE statement failed (best-effort, non-fatal).
    pub skipped_indexes: Vec<String>,
    /// Source files that could not be opened at all.
    pub skipped_sources: Vec<String>,
}

impl MergeReport {
    pub fn table_rows(&self, table: &str) -> u64 {
        self.per_table
            .iter()
            .filter(|t| t.table == table)
            .map(|t| t.rows)
            .sum()
    }
}

/// Result of refreshing one group end to end.
#[derive(Debug)]
pub struct GroupRefresh {
    pub group: String,
    pub success: bool,
    /// Path of the freshly merged database, when the merge completed.
    pub merged_path: Option<PathBuf>,
    pub fetched: usize,
    pub failed: usize,
    pub report: Option<MergeReport>,
}

/// Response body for `POST /api/refresh` and the `refresh` CLI command.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    /// True only when every group refreshed successfully.
    pub success: bool,
    #[serde(flatten)]
    pub groups: BTreeMap<String, bool>,
    pub timestamp: DateTime<Utc>,
}

/// Per-table row count inside [`GroupStats`].
#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// Response body for the `/stats` endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    pub group: String,
    pub tables: Vec<TableCount>,
    pub total_rows: i64,
    pub file_size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub source_count: usize,
}
