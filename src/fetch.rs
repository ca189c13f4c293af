//! Remote database fetcher.
//!
//! Downloads one SQLite file from object storage to a local scratch path.
//! The body is written to a `.part` sibling and renamed into place, so the
//! destination path only ever holds a fully materialized file.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Additional attempts after the first failure.
pub const MAX_RETRIES: u32 = 3;
/// Fixed delay between attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Download `url` into `dest` once.
pub async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), FetchError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })?;

    if !resp.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }

    let bytes = resp.bytes().await.map_err(|e| FetchError::Network {
        url: url.to_string(),
        source: e,
    })?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let part = part_path(dest);
    tokio::fs::write(&part, &bytes)
        .await
        .map_err(|e| FetchError::Io {
            path: part.clone(),
            source: e,
        })?;
    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| FetchError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

/// Download with the fixed retry budget. Returns the last error after
/// exhaustion; the caller decides whether the group can proceed without
/// this source.
pub async fn fetch_with_retry(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), FetchError> {
    let mut attempt = 0u32;
    loop {
        match fetch_to_file(client, url, dest).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                if attempt >= MAX_RETRIES {
                    return Err(err);
                }
                attempt += 1;
                eprintln!(
                    "fetch {} failed ({}), retry {}/{}",
                    url, err, attempt, MAX_RETRIES
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}
