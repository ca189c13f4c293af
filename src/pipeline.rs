//! Per-group refresh orchestration: fetch → schema → merge → cleanup.
//!
//! Fetches every source in the group concurrently, extracts the schema from
//! the first source that arrived intact, merges all successes into a freshly
//! named output file, and deletes the per-source scratch files no matter how
//! the merge went. The previously live merged file is never touched here;
//! swapping to the new one is the connection manager's job.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::GroupConfig;
use crate::fetch;
use crate::merge;
use crate::models::{DownloadResult, GroupRefresh, SourceDescriptor};
use crate::schema;

/// Run one refresh for `group` against the resolved `urls`.
pub async fn refresh_group(
    client: &reqwest::Client,
    group: &GroupConfig,
    urls: &[String],
    data_dir: &Path,
) -> GroupRefresh {
    let scratch_dir = data_dir.join("scratch");

    let descriptors: Vec<SourceDescriptor> = urls
        .iter()
        .enumerate()
        .map(|(idx, url)| SourceDescriptor {
            url: url.clone(),
            group: group.name.clone(),
            local_path: scratch_dir.join(format!("{}-{}-{}.sqlite", group.name, idx, Uuid::new_v4())),
        })
        .collect();

    let downloads = fetch_all(client, &descriptors).await;

    // Declaration order, not arrival order, so id reassignment is
    // reproducible across runs.
    let successes: Vec<PathBuf> = downloads
        .iter()
        .filter(|d| d.ok())
        .map(|d| d.descriptor.local_path.clone())
        .collect();
    let failed = downloads.len() - successes.len();

    for download in &downloads {
        if let Err(e) = &download.outcome {
            eprintln!("source {} dropped: {}", download.descriptor.url, e);
        }
    }

    if successes.is_empty() {
        println!("group {}: all {} sources failed, keeping previous data", group.name, urls.len());
        cleanup(&descriptors);
        return GroupRefresh {
            group: group.name.clone(),
            success: false,
            merged_path: None,
            fetched: 0,
            failed,
            report: None,
        };
    }

    let schema = match schema::extract_schema(&successes[0]).await {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("group {}: schema extraction failed: {}", group.name, e);
            cleanup(&descriptors);
            return GroupRefresh {
                group: group.name.clone(),
                success: false,
                merged_path: None,
                fetched: successes.len(),
                failed,
                report: None,
            };
        }
    };

    // Fresh nonce-named output; the live file for this group stays intact
    // until the connection manager swaps over.
    let output = data_dir.join(format!("{}-merged-{}.sqlite", group.name, Uuid::new_v4()));

    let result = merge::merge_group(&schema, &successes, &output).await;
    cleanup(&descriptors);

    match result {
        Ok(report) => {
            println!(
                "group {}: merged {} rows across {} tables from {} sources ({} row errors)",
                group.name,
                report.rows_merged,
                report.per_table.len(),
                successes.len(),
                report.row_errors
            );
            GroupRefresh {
                group: group.name.clone(),
                success: true,
                merged_path: Some(output),
                fetched: successes.len(),
                failed,
                report: Some(report),
            }
        }
        Err(e) => {
            eprintln!("group {}: merge failed: {}", group.name, e);
            let _ = merge::remove_database_files(&output);
            GroupRefresh {
                group: group.name.clone(),
                success: false,
                merged_path: None,
                fetched: successes.len(),
                failed,
                report: None,
            }
        }
    }
}

/// Fan out all fetches concurrently; settle results in declaration order.
async fn fetch_all(
    client: &reqwest::Client,
    descriptors: &[SourceDescriptor],
) -> Vec<DownloadResult> {
    let handles: Vec<_> = descriptors
        .iter()
        .map(|descriptor| {
            let client = client.clone();
            let url = descriptor.url.clone();
            let dest = descriptor.local_path.clone();
            tokio::spawn(async move { fetch::fetch_with_retry(&client, &url, &dest).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (handle, descriptor) in handles.into_iter().zip(descriptors.iter()) {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(fetch::FetchError::Io {
                path: descriptor.local_path.clone(),
                source: std::io::Error::other(join_err),
            }),
        };
        results.push(DownloadResult {
            descriptor: descriptor.clone(),
            outcome,
        });
    }
    results
}

/// Cleanup is unconditional: scratch files go away whether or not the merge
/// used them.
fn cleanup(descriptors: &[SourceDescriptor]) {
    for descriptor in descriptors {
        let _ = std::fs::remove_file(&descriptor.local_path);
    }
}
