//! Live query handles, one per group.
//!
//! The only state shared between the refresh pipeline (writer) and the query
//! endpoints (readers). Handles are replaced, never mutated: activation swaps
//! the map entry in one write-lock critical section, so a reader sees either
//! the fully-old or fully-new handle. Queries that already cloned the old
//! `Arc` keep using it; its pool tears down when the last clone drops.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db;
use crate::merge;

/// Read-only view of one group's current merged database.
pub struct GroupHandle {
    pub group: String,
    pub pool: SqlitePool,
    pub path: PathBuf,
    pub source_count: usize,
    pub activated_at: DateTime<Utc>,
}

/// Owner of all per-group handles. Shared via `Arc` between the scheduler
/// and the HTTP layer.
#[derive(Default)]
pub struct LiveHandles {
    inner: RwLock<HashMap<String, Arc<GroupHandle>>>,
}

impl LiveHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current handle for `group`, if any refresh ever succeeded.
    pub async fn handle(&self, group: &str) -> Option<Arc<GroupHandle>> {
        self.inner.read().await.get(group).cloned()
    }

    /// Point `group` at a freshly merged database.
    ///
    /// Opens the new read-only pool before touching the map; if the file is
    /// missing or unreadable the existing handle stays in place. The replaced
    /// handle's file is deleted here — merged files are nonce-named, so the
    /// old and new paths never collide.
    pub async fn activate(&self, group: &str, path: PathBuf, source_count: usize) -> Result<()> {
        let pool = db::open_ro(&path)
            .await
            .with_context(|| format!("failed to open merged database {}", path.display()))?;

        let handle = Arc::new(GroupHandle {
            group: group.to_string(),
            pool,
            path,
            source_count,
            activated_at: Utc::now(),
        });

        let replaced = {
            let mut map = self.inner.write().await;
            map.insert(group.to_string(), handle)
        };

        if let Some(old) = replaced {
            // In-flight queries may still hold the old Arc; the unlinked file
            // stays readable through their open connections.
            let _ = merge::remove_database_files(&old.path);
        }

        Ok(())
    }

    /// Close every pool. Process shutdown only.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<GroupHandle>> = {
            let mut map = self.inner.write().await;
            map.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            handle.pool.close().await;
        }
    }
}
