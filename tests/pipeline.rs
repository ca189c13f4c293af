//! End-to-end pipeline tests: stub object storage → fetch → merge → activate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use pagepulse::config::{Config, GroupConfig, RefreshConfig, ServerConfig, StorageConfig};
use pagepulse::db;
use pagepulse::fetch;
use pagepulse::live::LiveHandles;
use pagepulse::pipeline;
use pagepulse::scheduler::Refresher;

/// Build a SQLite database in `dir` and return its raw bytes.
async fn fixture_db_bytes(dir: &TempDir, name: &str, statements: &[&str]) -> Vec<u8> {
    let path = dir.path().join(name);
    let pool = db::open_rw(&path).await.unwrap();
    for stmt in statements {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool.close().await;
    std::fs::read(&path).unwrap()
}

/// Serve the given (path, bytes) objects over HTTP on an ephemeral port.
/// Unknown paths 404. Returns the base URL.
async fn stub_object_store(objects: Vec<(&'static str, Vec<u8>)>) -> String {
    use axum::{routing::get, Router};

    let mut router = Router::new();
    for (path, bytes) in objects {
        router = router.route(
            path,
            get(move || {
                let bytes = bytes.clone();
                async move { bytes }
            }),
        );
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn group(name: &str, sources: Vec<String>) -> GroupConfig {
    GroupConfig {
        name: name.to_string(),
        sources,
        primary_table: Some("reports".to_string()),
        baseline_table: None,
    }
}

fn test_config(data_dir: &Path, groups: Vec<GroupConfig>) -> Arc<Config> {
    Arc::new(Config {
        server: ServerConfig::default(),
        refresh: RefreshConfig {
            interval_secs: 900,
            data_dir: data_dir.to_path_buf(),
        },
        storage: StorageConfig::default(),
        groups,
    })
}

#[tokio::test]
async fn fetch_writes_fully_materialized_file() {
    let dir = TempDir::new().unwrap();
    let bytes = fixture_db_bytes(&dir, "src.sqlite", &["CREATE TABLE t (id INTEGER PRIMARY KEY)"])
        .await;
    let base = stub_object_store(vec![("/a.sqlite", bytes.clone())]).await;

    let client = reqwest::Client::new();
    let dest = dir.path().join("downloaded.sqlite");
    fetch::fetch_to_file(&client, &format!("{}/a.sqlite", base), &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), bytes);
    let leftover: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "part"))
        .collect();
    assert!(leftover.is_empty());
}

#[tokio::test]
async fn fetch_retries_then_reports_status_error() {
    let base = stub_object_store(vec![]).await;
    let dir = TempDir::new().unwrap();

    let client = reqwest::Client::new();
    let started = std::time::Instant::now();
    let err = fetch::fetch_with_retry(
        &client,
        &format!("{}/missing.sqlite", base),
        &dir.path().join("x.sqlite"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, fetch::FetchError::Status { status: 404, .. }));
    // 3 retries with a 1s fixed delay between the 4 attempts.
    assert!(started.elapsed().as_secs() >= 3);
}

#[tokio::test]
async fn refresh_group_merges_overlapping_sources() {
    let dir = TempDir::new().unwrap();
    let a = fixture_db_bytes(
        &dir,
        "a.sqlite",
        &[
            "CREATE TABLE reports (id INTEGER PRIMARY KEY, score INT)",
            "INSERT INTO reports VALUES (1, 90), (2, 80)",
        ],
    )
    .await;
    let b = fixture_db_bytes(
        &dir,
        "b.sqlite",
        &[
            "CREATE TABLE reports (id INTEGER PRIMARY KEY, score INT)",
            "INSERT INTO reports VALUES (1, 70), (2, 60)",
        ],
    )
    .await;
    let base = stub_object_store(vec![("/a.sqlite", a), ("/b.sqlite", b)]).await;

    let data_dir = dir.path().join("data");
    let client = reqwest::Client::new();
    let urls = vec![format!("{}/a.sqlite", base), format!("{}/b.sqlite", base)];
    let refresh = pipeline::refresh_group(&client, &group("lighthouse", vec![]), &urls, &data_dir).await;

    assert!(refresh.success);
    assert_eq!(refresh.fetched, 2);
    assert_eq!(refresh.failed, 0);
    let report = refresh.report.unwrap();
    assert_eq!(report.rows_merged, 4);
    assert_eq!(report.row_errors, 0);

    let merged = refresh.merged_path.unwrap();
    let pool = db::open_ro(&merged).await.unwrap();
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM reports ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    pool.close().await;
}

#[tokio::test]
async fn refresh_group_tolerates_partial_fetch_failure() {
    let dir = TempDir::new().unwrap();
    let a = fixture_db_bytes(
        &dir,
        "a.sqlite",
        &[
            "CREATE TABLE reports (id INTEGER PRIMARY KEY, score INT)",
            "INSERT INTO reports VALUES (1, 90)",
        ],
    )
    .await;
    let base = stub_object_store(vec![("/a.sqlite", a)]).await;

    let data_dir = dir.path().join("data");
    let client = reqwest::Client::new();
    let urls = vec![
        format!("{}/a.sqlite", base),
        format!("{}/gone.sqlite", base),
    ];
    let refresh = pipeline::refresh_group(&client, &group("lighthouse", vec![]), &urls, &data_dir).await;

    assert!(refresh.success);
    assert_eq!(refresh.fetched, 1);
    assert_eq!(refresh.failed, 1);
    assert_eq!(refresh.report.unwrap().rows_merged, 1);
}

#[tokio::test]
async fn refresh_group_total_failure_produces_no_file() {
    let dir = TempDir::new().unwrap();
    let base = stub_object_store(vec![]).await;

    let data_dir = dir.path().join("data");
    let client = reqwest::Client::new();
    let urls = vec![format!("{}/gone.sqlite", base)];
    let refresh = pipeline::refresh_group(&client, &group("lighthouse", vec![]), &urls, &data_dir).await;

    assert!(!refresh.success);
    assert!(refresh.merged_path.is_none());
    assert_eq!(refresh.fetched, 0);
}

#[tokio::test]
async fn scratch_files_are_deleted_after_refresh() {
    let dir = TempDir::new().unwrap();
    let a = fixture_db_bytes(
        &dir,
        "a.sqlite",
        &["CREATE TABLE reports (id INTEGER PRIMARY KEY, score INT)"],
    )
    .await;
    let base = stub_object_store(vec![("/a.sqlite", a)]).await;

    let data_dir = dir.path().join("data");
    let client = reqwest::Client::new();
    let urls = vec![format!("{}/a.sqlite", base)];
    pipeline::refresh_group(&client, &group("lighthouse", vec![]), &urls, &data_dir).await;

    let scratch = data_dir.join("scratch");
    let leftovers: Vec<PathBuf> = std::fs::read_dir(&scratch)
        .map(|rd| rd.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "scratch not cleaned: {:?}", leftovers);
}

#[tokio::test]
async fn failed_cycle_leaves_previous_handle_and_file_untouched() {
    let dir = TempDir::new().unwrap();
    let a = fixture_db_bytes(
        &dir,
        "a.sqlite",
        &[
            "CREATE TABLE reports (id INTEGER PRIMARY KEY, score INT)",
            "INSERT INTO reports VALUES (1, 90)",
        ],
    )
    .await;
    let base = stub_object_store(vec![("/a.sqlite", a)]).await;
    let data_dir = dir.path().join("data");

    let good = vec![format!("{}/a.sqlite", base)];
    let config = test_config(&data_dir, vec![group("lighthouse", good)]);
    let handles = Arc::new(LiveHandles::new());
    let refresher = Refresher::new(config, handles.clone());

    let first = refresher.refresh_all().await;
    assert!(first.success);
    let handle_before = handles.handle("lighthouse").await.unwrap();
    let path_before = handle_before.path.clone();

    // Same group, now pointing at a dead source.
    let bad = vec![format!("{}/vanished.sqlite", base)];
    let config = test_config(&data_dir, vec![group("lighthouse", bad)]);
    let refresher = Refresher::new(config, handles.clone());

    let second = refresher.refresh_all().await;
    assert!(!second.success);
    assert_eq!(second.groups.get("lighthouse"), Some(&false));

    let handle_after = handles.handle("lighthouse").await.unwrap();
    assert_eq!(handle_after.path, path_before);
    assert!(path_before.exists());
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
        .fetch_one(&handle_after.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn repeated_refresh_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let a = fixture_db_bytes(
        &dir,
        "a.sqlite",
        &[
            "CREATE TABLE reports (id INTEGER PRIMARY KEY, score INT)",
            "INSERT INTO reports VALUES (1, 90), (2, 80)",
        ],
    )
    .await;
    let b = fixture_db_bytes(
        &dir,
        "b.sqlite",
        &[
            "CREATE TABLE reports (id INTEGER PRIMARY KEY, score INT)",
            "INSERT INTO reports VALUES (1, 70)",
        ],
    )
    .await;
    let base = stub_object_store(vec![("/a.sqlite", a), ("/b.sqlite", b)]).await;
    let data_dir = dir.path().join("data");

    let urls = vec![format!("{}/a.sqlite", base), format!("{}/b.sqlite", base)];
    let config = test_config(&data_dir, vec![group("lighthouse", urls)]);
    let handles = Arc::new(LiveHandles::new());
    let refresher = Refresher::new(config, handles.clone());

    refresher.refresh_all().await;
    let count_first: i64 = {
        let handle = handles.handle("lighthouse").await.unwrap();
        sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&handle.pool)
            .await
            .unwrap()
    };

    refresher.refresh_all().await;
    let count_second: i64 = {
        let handle = handles.handle("lighthouse").await.unwrap();
        sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&handle.pool)
            .await
            .unwrap()
    };

    assert_eq!(count_first, 3);
    assert_eq!(count_first, count_second);
}
