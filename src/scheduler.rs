//! Refresh scheduling.
//!
//! One cycle refreshes every configured group in sequence (sources within a
//! group download concurrently) and activates a handle for each group whose
//! merge completed. Cycles run at startup, on a fixed interval, and on demand
//! via `POST /api/refresh`.
//!
//! Cycles are serialized through `in_flight`: a timer tick that fires while
//! a cycle is still running is skipped, while an on-demand refresh waits its
//! turn so its synchronous contract holds.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::live::LiveHandles;
use crate::models::RefreshOutcome;
use crate::pipeline;

pub struct Refresher {
    config: Arc<Config>,
    client: reqwest::Client,
    handles: Arc<LiveHandles>,
    in_flight: Mutex<()>,
}

impl Refresher {
    pub fn new(config: Arc<Config>, handles: Arc<LiveHandles>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            handles,
            in_flight: Mutex::new(()),
        }
    }

    /// Run one full refresh cycle, waiting for any in-progress cycle first.
    pub async fn refresh_all(&self) -> RefreshOutcome {
        let _guard = self.in_flight.lock().await;
        self.run_cycle().await
    }

    /// Timer entry point: skip the tick if a cycle is still running.
    pub async fn tick(&self) -> Option<RefreshOutcome> {
        match self.in_flight.try_lock() {
            Ok(_guard) => Some(self.run_cycle().await),
            Err(_) => {
                println!("refresh cycle still running, skipping timer tick");
                None
            }
        }
    }

    async fn run_cycle(&self) -> RefreshOutcome {
        let started = std::time::Instant::now();
        let mut groups = BTreeMap::new();

        for group in &self.config.groups {
            let urls = group.resolved_sources(&self.config.storage);
            if urls.is_empty() {
                println!("group {}: no sources configured", group.name);
                groups.insert(group.name.clone(), false);
                continue;
            }

            let refresh = pipeline::refresh_group(
                &self.client,
                group,
                &urls,
                &self.config.refresh.data_dir,
            )
            .await;

            let mut ok = refresh.success;
            if let (true, Some(path)) = (refresh.success, refresh.merged_path.clone()) {
                if let Err(e) = self.handles.activate(&group.name, path, refresh.fetched).await {
                    eprintln!("group {}: activation failed: {:#}", group.name, e);
                    ok = false;
                }
            }
            groups.insert(group.name.clone(), ok);
        }

        let success = !groups.is_empty() && groups.values().all(|ok| *ok);
        println!(
            "refresh cycle finished in {:.1}s ({}/{} groups ok)",
            started.elapsed().as_secs_f64(),
            groups.values().filter(|ok| **ok).count(),
            groups.len()
        );

        RefreshOutcome {
            success,
            groups,
            timestamp: Utc::now(),
        }
    }

    /// Periodic loop. The immediate first tick is consumed so the caller's
    /// startup refresh is not doubled.
    pub async fn run_interval_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.refresh.interval_secs,
        ));
        interval.tick().await;
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}
