//! Read-only HTTP query layer.
//!
//! Serves merged group databases as JSON and exposes the on-demand refresh
//! trigger. Handlers only ever touch a handle they cloned out of
//! [`LiveHandles`], so a refresh swapping handles mid-request is invisible
//! to them.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Health check |
//! | `GET`  | `/api/lighthouse/data` | Primary result table, newest first |
//! | `GET`  | `/api/lighthouse/stats` | Table/row counts, file size, mtime |
//! | `GET`  | `/api/visual/data` | Every table of the visual group |
//! | `GET`  | `/api/visual/stats` | Stats for the visual group |
//! | `GET`  | `/api/baseline/data` | The visual group's baseline table |
//! | `GET`  | `/api/data` | Legacy alias of `/api/lighthouse/data` |
//! | `POST` | `/api/refresh` | Run one refresh cycle synchronously |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "service_unavailable", "message": "no merged data for group 'visual' yet" } }
//! ```
//!
//! Codes: `service_unavailable` (503), `not_found` (404), `internal` (500).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::{Column, Row, SqlitePool};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::live::{GroupHandle, LiveHandles};
use crate::models::RefreshOutcome;
use crate::scheduler::Refresher;
use crate::schema;
use crate::stats;
use crate::value::{quote_ident, SqlValue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub handles: Arc<LiveHandles>,
    pub refresher: Arc<Refresher>,
}

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/lighthouse/data", get(handle_lighthouse_data))
        .route("/api/lighthouse/stats", get(handle_lighthouse_stats))
        .route("/api/visual/data", get(handle_visual_data))
        .route("/api/visual/stats", get(handle_visual_stats))
        .route("/api/baseline/data", get(handle_baseline_data))
        .route("/api/data", get(handle_lighthouse_data))
        .route("/api/refresh", post(handle_refresh))
        .layer(cors)
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Bind and serve until the process is terminated.
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.config.server.bind.clone();
    let app = router(state);

    println!("pagepulse listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn service_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "service_unavailable".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Data endpoints ============

async fn handle_lighthouse_data(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let handle = group_handle(&state, "lighthouse").await?;
    let table = state
        .config
        .group("lighthouse")
        .and_then(|g| g.primary_table.clone())
        .unwrap_or_else(|| "reports".to_string());

    if !table_exists(&handle.pool, &table).await.map_err(internal)? {
        return Err(not_found(format!("table '{}' not present in merged data", table)));
    }

    let rows = table_rows(&handle.pool, &table, true).await.map_err(internal)?;
    Ok(Json(serde_json::Value::Array(rows)))
}

async fn handle_visual_data(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let handle = group_handle(&state, "visual").await?;

    let table_names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&handle.pool)
    .await
    .map_err(|e| internal(e.into()))?;

    let mut body = serde_json::Map::new();
    for table in table_names {
        let rows = table_rows(&handle.pool, &table, false).await.map_err(internal)?;
        body.insert(table, serde_json::Value::Array(rows));
    }

    Ok(Json(serde_json::Value::Object(body)))
}

async fn handle_baseline_data(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let handle = group_handle(&state, "visual").await?;
    let table = state
        .config
        .group("visual")
        .and_then(|g| g.baseline_table.clone())
        .unwrap_or_else(|| "baselines".to_string());

    if !table_exists(&handle.pool, &table).await.map_err(internal)? {
        return Err(not_found(format!("table '{}' not present in merged data", table)));
    }

    let rows = table_rows(&handle.pool, &table, false).await.map_err(internal)?;
    Ok(Json(serde_json::Value::Array(rows)))
}

// ============ Stats endpoints ============

async fn handle_lighthouse_stats(
    State(state): State<AppState>,
) -> Result<Json<crate::models::GroupStats>, AppError> {
    group_stats(&state, "lighthouse").await
}

async fn handle_visual_stats(
    State(state): State<AppState>,
) -> Result<Json<crate::models::GroupStats>, AppError> {
    group_stats(&state, "visual").await
}

async fn group_stats(
    state: &AppState,
    group: &str,
) -> Result<Json<crate::models::GroupStats>, AppError> {
    let handle = group_handle(state, group).await?;
    let stats = stats::group_stats(&handle).await.map_err(internal)?;
    Ok(Json(stats))
}

// ============ POST /api/refresh ============

async fn handle_refresh(State(state): State<AppState>) -> Json<RefreshOutcome> {
    Json(state.refresher.refresh_all().await)
}

// ============ Helpers ============

async fn group_handle(state: &AppState, group: &str) -> Result<Arc<GroupHandle>, AppError> {
    state
        .handles
        .handle(group)
        .await
        .ok_or_else(|| service_unavailable(format!("no merged data for group '{}' yet", group)))
}

async fn table_exists(pool: &SqlitePool, table: &str) -> anyhow::Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Columns treated as "the timestamp" for ordering purposes, first match wins.
const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "created_at", "recorded_at", "updated_at"];

/// Fetch all rows of `table` as JSON objects. `newest_first` reverses the
/// order for feed-style endpoints. Ordering falls back from a timestamp
/// column to `id` to unordered.
async fn table_rows(
    pool: &SqlitePool,
    table: &str,
    newest_first: bool,
) -> anyhow::Result<Vec<serde_json::Value>> {
    let columns = schema::table_columns(pool, table).await?;

    let order_column = TIMESTAMP_COLUMNS
        .iter()
        .find(|ts| columns.iter().any(|c| c.name == **ts))
        .map(|ts| ts.to_string())
        .or_else(|| columns.iter().find(|c| c.name == "id").map(|c| c.name.clone()));

    let mut sql = format!("SELECT * FROM {}", quote_ident(table));
    if let Some(col) = order_column {
        sql.push_str(&format!(" ORDER BY {}", quote_ident(&col)));
        if newest_first {
            sql.push_str(" DESC");
        }
    }

    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut object = serde_json::Map::new();
        for (i, column) in row.columns().iter().enumerate() {
            object.insert(column.name().to_string(), SqlValue::from_row(row, i)?.to_json());
        }
        out.push(serde_json::Value::Object(object));
    }
    Ok(out)
}
