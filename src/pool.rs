//! # Content pool
//! Bounded, deduplicated, age-expiring cache of aggregated items on a single
//! refresh cadence. Fetching happens outside the state lock; only the
//! merge/sort/truncate/replace step is a critical section, so readers are
//! never blocked for the duration of network I/O.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use rand::seq::IndexedRandom;
use std::collections::HashMap;

use crate::fetch::Fetcher;
use crate::item::Item;
use crate::rotation;
use crate::scheduler::PeriodicTask;

/// One-time metrics registration (teachable series for the refresh paths).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pool_refresh_runs_total", "Completed pool refresh cycles.");
        describe_counter!("pool_fetched_total", "Items fetched across all sources.");
        describe_counter!(
            "pool_fetch_errors_total",
            "Per-source fetch failures (absorbed, cycle continues)."
        );
        describe_gauge!("pool_items", "Items currently held in the pool.");
        describe_gauge!("pool_last_refresh_ts", "Unix ts of the last completed refresh.");
    });
}

#[derive(Clone, Copy, Debug)]
pub struct PoolCfg {
    pub max_size: usize,
    pub ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub rotation_period_secs: u64,
}

impl Default for PoolCfg {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl_secs: 6 * 3600,
            refresh_interval_secs: 60,
            rotation_period_secs: rotation::DEFAULT_ROTATION_SECS,
        }
    }
}

/// What one source contributed to a refresh cycle. Failures are carried as
/// strings so callers (and tests) can see them without the cycle erroring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub fetched: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RefreshReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl RefreshReport {
    pub fn fetched_total(&self) -> usize {
        self.outcomes.iter().map(|o| o.fetched).sum()
    }

    pub fn failed_sources(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.source.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStatus {
    pub count: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub sources: Vec<String>,
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Descending by `captured_at`; unique titles; len <= max_size.
    items: Vec<Item>,
    last_refresh: Option<DateTime<Utc>>,
}

pub struct ContentPool {
    cfg: PoolCfg,
    source_keys: Vec<String>,
    fetchers: Vec<Arc<dyn Fetcher>>,
    state: Mutex<PoolState>,
    task: Mutex<Option<PeriodicTask>>,
}

impl ContentPool {
    pub fn new(cfg: PoolCfg, source_keys: Vec<String>, fetchers: Vec<Arc<dyn Fetcher>>) -> Self {
        ensure_metrics_described();
        Self {
            cfg,
            source_keys,
            fetchers,
            state: Mutex::new(PoolState::default()),
            task: Mutex::new(None),
        }
    }

    /// Run every fetcher and fold the results into the pool. A failing
    /// fetcher contributes zero items and is logged; it never aborts the
    /// cycle. Safe to call concurrently with reads and with itself — the
    /// merge step is idempotent and atomic per invocation.
    pub async fn refresh(&self) -> RefreshReport {
        self.refresh_at(Utc::now()).await
    }

    /// As `refresh`, with an explicit cycle start time for deterministic tests.
    pub async fn refresh_at(&self, started: DateTime<Utc>) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut incoming: Vec<Item> = Vec::new();

        // Network I/O happens here, outside any lock.
        for fetcher in &self.fetchers {
            match fetcher.fetch().await {
                Ok(raw) => {
                    let count = raw.len();
                    incoming.extend(
                        raw.into_iter()
                            .filter(|r| !r.title.is_empty())
                            .map(|r| Item::from_raw(r, fetcher.source(), started)),
                    );
                    tracing::info!(source = fetcher.source(), count, "fetched items");
                    report.outcomes.push(SourceOutcome {
                        source: fetcher.source().to_string(),
                        fetched: count,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(source = fetcher.source(), error = ?e, "fetch failed");
                    counter!("pool_fetch_errors_total").increment(1);
                    report.outcomes.push(SourceOutcome {
                        source: fetcher.source().to_string(),
                        fetched: 0,
                        error: Some(format!("{e:#}")),
                    });
                }
            }
        }
        counter!("pool_fetched_total").increment(report.fetched_total() as u64);

        let count = {
            let mut st = self.state.lock().expect("pool mutex poisoned");
            let existing = std::mem::take(&mut st.items);
            st.items = merge_dedup_expire(
                started,
                existing,
                incoming,
                self.cfg.ttl_secs,
                self.cfg.max_size,
            );
            st.last_refresh = Some(started);
            st.items.len()
        };

        counter!("pool_refresh_runs_total").increment(1);
        gauge!("pool_items").set(count as f64);
        gauge!("pool_last_refresh_ts").set(started.timestamp() as f64);
        tracing::info!(count, "pool refresh complete");

        report
    }

    /// Deterministic "current" item: `items[(epoch / R) % len]`. Two
    /// observers at the same second pick the same item.
    pub fn rotating_at(&self, epoch_secs: u64) -> Option<Item> {
        let st = self.state.lock().expect("pool mutex poisoned");
        rotation::rotation_index(epoch_secs, self.cfg.rotation_period_secs, st.items.len())
            .map(|i| st.items[i].clone())
    }

    pub fn rotating(&self) -> Option<Item> {
        self.rotating_at(now_unix())
    }

    /// Uniform sample without replacement, `min(n, len)` items. An empty
    /// pool yields an empty vec, never an error.
    pub fn random_sample(&self, n: usize) -> Vec<Item> {
        let st = self.state.lock().expect("pool mutex poisoned");
        st.items
            .choose_multiple(&mut rand::rng(), n.min(st.items.len()))
            .cloned()
            .collect()
    }

    pub fn status(&self) -> PoolStatus {
        let st = self.state.lock().expect("pool mutex poisoned");
        PoolStatus {
            count: st.items.len(),
            last_refresh: st.last_refresh,
            sources: self.source_keys.clone(),
            refresh_interval_secs: self.cfg.refresh_interval_secs,
        }
    }

    /// All items, newest first, as of the last completed refresh.
    pub fn snapshot(&self) -> Vec<Item> {
        self.state.lock().expect("pool mutex poisoned").items.clone()
    }

    /// Spawn the background refresh loop. The first cycle runs immediately.
    /// No-op if already started.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock().expect("pool task mutex poisoned");
        if slot.is_some() {
            tracing::warn!("pool refresh task already running");
            return;
        }
        let pool = Arc::clone(self);
        *slot = Some(PeriodicTask::spawn(
            "pool-refresh",
            Duration::from_secs(self.cfg.refresh_interval_secs),
            move || {
                let pool = pool.clone();
                async move {
                    pool.refresh().await;
                }
            },
        ));
    }

    /// Halt future scheduled refreshes. An in-flight refresh is not
    /// cancelled; its result lands best-effort.
    pub async fn stop(&self) {
        let task = self.task.lock().expect("pool task mutex poisoned").take();
        if let Some(task) = task {
            task.stop().await;
        }
    }
}

/// The merge-dedup-expire policy: concat incoming with existing, keep the
/// more recently captured entry per title, sort newest first, drop entries
/// older than `ttl_secs`, truncate to `max_size`. Pure, so tests can pin
/// the clock.
pub fn merge_dedup_expire(
    now: DateTime<Utc>,
    existing: Vec<Item>,
    incoming: Vec<Item>,
    ttl_secs: u64,
    max_size: usize,
) -> Vec<Item> {
    let mut by_title: HashMap<String, Item> = HashMap::with_capacity(existing.len() + incoming.len());
    for item in existing.into_iter().chain(incoming) {
        match by_title.get(&item.title) {
            Some(held) if held.captured_at >= item.captured_at => {}
            _ => {
                by_title.insert(item.title.clone(), item);
            }
        }
    }

    let mut merged: Vec<Item> = by_title
        .into_values()
        .filter(|i| now.signed_duration_since(i.captured_at).num_seconds() <= ttl_secs as i64)
        .collect();
    // Title as tiebreaker keeps equal-timestamp ordering deterministic.
    merged.sort_by(|a, b| b.captured_at.cmp(&a.captured_at).then_with(|| a.title.cmp(&b.title)));
    merged.truncate(max_size);
    merged
}

fn now_unix() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
