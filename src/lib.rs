//! # pagepulse
//!
//! Periodically downloads groups of SQLite scan databases from remote object
//! storage, merges each group into a single local database with conflict-free
//! primary-key reassignment, and serves the merged data through a small
//! read-only JSON API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Object      │──▶│ fetch + merge │──▶│ merged .sqlite│
//! │  storage     │   │  (per group)  │   │  (per group)  │
//! └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                               │ swap
//!                                        ┌──────▼───────┐
//!                                        │ live handles │──▶ HTTP /api/*
//!                                        └──────────────┘
//! ```
//!
//! A refresh cycle runs at startup, every `refresh.interval_secs`, and on
//! `POST /api/refresh`. Queries always read the previous stable database
//! until the connection manager swaps handles after a successful merge.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, env overrides, group definitions |
//! | [`fetch`] | Remote file download with bounded retry |
//! | [`schema`] | Schema extraction from a reference database |
//! | [`merge`] | Row merge with surrogate-key reassignment |
//! | [`pipeline`] | Per-group fetch → merge → cleanup orchestration |
//! | [`live`] | Swappable read-only query handles |
//! | [`scheduler`] | Startup / interval / on-demand refresh cycles |
//! | [`server`] | Axum HTTP query layer |
//! | [`stats`] | Per-group database statistics |
//! | [`value`] | Owned SQLite values for row movement and JSON output |

pub mod config;
pub mod db;
pub mod fetch;
pub mod live;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod schema;
pub mod server;
pub mod stats;
pub mod value;
