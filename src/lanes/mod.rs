//! # Multi-lane pool
//! Three independently-cadenced lanes over one state lock: a merge-dedup-
//! expire lane for index quotes, a full-replace lane for sector movers, and
//! a full-replace lane for short bulletins windowed to the last 15 minutes
//! of source-reported time. A coarse tick drives all three; each lane only
//! refreshes when its own interval has elapsed, and a slow or failing lane
//! never blocks another.

pub mod feeds;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::rotation;
use crate::scheduler::PeriodicTask;

/// One-time registration of the lane metric series.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("lane_refresh_total", "Per-lane refresh attempts.");
        describe_counter!("lane_refresh_errors_total", "Per-lane feed failures.");
        describe_counter!(
            "lane_bulletin_parse_skips_total",
            "Bulletin records dropped for unparseable times."
        );
    });
}

// ---------- lane records ----------

/// Structured numeric snapshot, e.g. one market index.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct IndexQuote {
    pub name: String,
    pub value: f64,
    pub change_pct: f64,
    pub captured_at: DateTime<Utc>,
}

/// Ranked categorical mover; direction derives from the sign of the move.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct SectorMover {
    pub name: String,
    pub change_pct: f64,
    pub direction: Direction,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Short wire-style bulletin, already windowed and sorted at install time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Bulletin {
    pub text: String,
    /// Source-reported intraday time, `HH:MM:SS`.
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<String>,
}

// ---------- feed boundary (samples are unstamped; lanes stamp on install) ----------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct IndexSample {
    pub name: String,
    pub value: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct SectorSample {
    pub name: String,
    pub change_pct: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawBulletin {
    pub text: String,
    /// Source-reported intraday time string, expected `HH:MM:SS`.
    pub time_text: String,
    pub auxiliary: Option<String>,
}

#[async_trait::async_trait]
pub trait IndicesFeed: Send + Sync {
    async fn fetch_indices(&self) -> Result<Vec<IndexSample>>;
}

#[async_trait::async_trait]
pub trait SectorsFeed: Send + Sync {
    async fn fetch_sectors(&self) -> Result<Vec<SectorSample>>;
}

#[async_trait::async_trait]
pub trait BulletinsFeed: Send + Sync {
    async fn fetch_bulletins(&self) -> Result<Vec<RawBulletin>>;
}

pub struct MarketFeeds {
    pub indices: Arc<dyn IndicesFeed>,
    pub sectors: Arc<dyn SectorsFeed>,
    pub bulletins: Arc<dyn BulletinsFeed>,
}

// ---------- configuration ----------

#[derive(Clone, Copy, Debug)]
pub struct LanesCfg {
    pub tick_secs: u64,
    pub indices_interval_secs: u64,
    pub sectors_interval_secs: u64,
    pub bulletins_interval_secs: u64,
    /// Merge-dedup-expire parameters for the indices lane.
    pub indices_ttl_secs: u64,
    pub indices_cap: usize,
    /// Look-back window on source-reported bulletin time.
    pub bulletin_window_secs: u64,
    pub bulletin_cap: usize,
}

impl Default for LanesCfg {
    fn default() -> Self {
        Self {
            tick_secs: 10,
            indices_interval_secs: 60,
            sectors_interval_secs: 300,
            bulletins_interval_secs: 30,
            indices_ttl_secs: 600,
            indices_cap: 50,
            bulletin_window_secs: 15 * 60,
            bulletin_cap: 5,
        }
    }
}

// ---------- state ----------

#[derive(Debug)]
struct LaneState<T> {
    /// Epoch seconds of the last refresh attempt; 0 = never. Advances on
    /// failure too, so a failing feed waits a full interval before retrying.
    last_update: u64,
    data: Vec<T>,
}

impl<T> Default for LaneState<T> {
    fn default() -> Self {
        Self {
            last_update: 0,
            data: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct LanesState {
    indices: LaneState<IndexQuote>,
    sectors: LaneState<SectorMover>,
    bulletins: LaneState<Bulletin>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LaneStatus {
    pub count: usize,
    pub last_update: Option<u64>,
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LanesStatus {
    pub indices: LaneStatus,
    pub sectors: LaneStatus,
    pub bulletins: LaneStatus,
    pub tick_secs: u64,
}

/// What the display client should show right now. `bulletin` with no item
/// means the lane has no fresh data yet.
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayPayload {
    Bulletin {
        #[serde(skip_serializing_if = "Option::is_none")]
        item: Option<Bulletin>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Market {
        indices: Vec<IndexQuote>,
        sectors: Vec<SectorMover>,
    },
}

const WAITING_FOR_DATA: &str = "waiting for data";

/// How many bulletins the display phase cycles through.
const DISPLAY_BULLETINS: usize = 3;

/// A parsed bulletin time this far ahead of "now" is taken to be yesterday's
/// (the source reports time-of-day only) and dropped rather than shown as
/// fresh.
const FUTURE_SKEW_SECS: i64 = 300;

pub struct MultiLanePool {
    cfg: LanesCfg,
    feeds: MarketFeeds,
    state: Mutex<LanesState>,
    task: Mutex<Option<PeriodicTask>>,
}

impl MultiLanePool {
    pub fn new(cfg: LanesCfg, feeds: MarketFeeds) -> Self {
        ensure_metrics_described();
        Self {
            cfg,
            feeds,
            state: Mutex::new(LanesState::default()),
            task: Mutex::new(None),
        }
    }

    /// One coarse scheduler tick: refresh every lane whose interval has
    /// elapsed. Due lanes run concurrently; `last_update` advances whether
    /// or not the feed succeeded.
    pub async fn tick(&self) {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) {
        let epoch = now.timestamp().max(0) as u64;
        let (indices_due, sectors_due, bulletins_due) = {
            let st = self.state.lock().expect("lanes mutex poisoned");
            (
                epoch.saturating_sub(st.indices.last_update) >= self.cfg.indices_interval_secs,
                epoch.saturating_sub(st.sectors.last_update) >= self.cfg.sectors_interval_secs,
                epoch.saturating_sub(st.bulletins.last_update) >= self.cfg.bulletins_interval_secs,
            )
        };

        tokio::join!(
            async {
                if indices_due {
                    self.refresh_indices(now, epoch).await;
                }
            },
            async {
                if sectors_due {
                    self.refresh_sectors(now, epoch).await;
                }
            },
            async {
                if bulletins_due {
                    self.refresh_bulletins(now, epoch).await;
                }
            },
        );
    }

    async fn refresh_indices(&self, now: DateTime<Utc>, epoch: u64) {
        counter!("lane_refresh_total", "lane" => "indices").increment(1);
        let fetched = self.feeds.indices.fetch_indices().await;
        let mut st = self.state.lock().expect("lanes mutex poisoned");
        st.indices.last_update = epoch;
        match fetched {
            Ok(samples) => {
                let incoming: Vec<IndexQuote> = samples
                    .into_iter()
                    .map(|s| IndexQuote {
                        name: s.name,
                        value: s.value,
                        change_pct: s.change_pct,
                        captured_at: now,
                    })
                    .collect();
                let existing = std::mem::take(&mut st.indices.data);
                st.indices.data = merge_indices(
                    now,
                    existing,
                    incoming,
                    self.cfg.indices_ttl_secs,
                    self.cfg.indices_cap,
                );
                tracing::info!(count = st.indices.data.len(), "indices lane refreshed");
            }
            Err(e) => {
                tracing::warn!(lane = "indices", error = ?e, "lane feed failed");
                counter!("lane_refresh_errors_total", "lane" => "indices").increment(1);
            }
        }
    }

    async fn refresh_sectors(&self, now: DateTime<Utc>, epoch: u64) {
        counter!("lane_refresh_total", "lane" => "sectors").increment(1);
        let fetched = self.feeds.sectors.fetch_sectors().await;
        let mut st = self.state.lock().expect("lanes mutex poisoned");
        st.sectors.last_update = epoch;
        match fetched {
            Ok(samples) => {
                // Full-replace: prior data goes away atomically.
                st.sectors.data = samples
                    .into_iter()
                    .map(|s| SectorMover {
                        direction: if s.change_pct < 0.0 {
                            Direction::Down
                        } else {
                            Direction::Up
                        },
                        name: s.name,
                        change_pct: s.change_pct,
                        captured_at: now,
                    })
                    .collect();
                tracing::info!(count = st.sectors.data.len(), "sectors lane replaced");
            }
            Err(e) => {
                tracing::warn!(lane = "sectors", error = ?e, "lane feed failed");
                counter!("lane_refresh_errors_total", "lane" => "sectors").increment(1);
            }
        }
    }

    async fn refresh_bulletins(&self, now: DateTime<Utc>, epoch: u64) {
        counter!("lane_refresh_total", "lane" => "bulletins").increment(1);
        let fetched = self.feeds.bulletins.fetch_bulletins().await;
        let mut st = self.state.lock().expect("lanes mutex poisoned");
        st.bulletins.last_update = epoch;
        match fetched {
            Ok(raw) => {
                st.bulletins.data = window_bulletins(
                    now,
                    raw,
                    self.cfg.bulletin_window_secs,
                    self.cfg.bulletin_cap,
                );
                tracing::info!(count = st.bulletins.data.len(), "bulletins lane replaced");
            }
            Err(e) => {
                tracing::warn!(lane = "bulletins", error = ?e, "lane feed failed");
                counter!("lane_refresh_errors_total", "lane" => "bulletins").increment(1);
            }
        }
    }

    /// Deterministic display selection on a repeating 10-second duty cycle:
    /// seconds [0,5) walk up to three bulletins, seconds [5,10) show the
    /// full market snapshot. Pure with respect to lane state at call time.
    pub fn display_content_at(&self, now: DateTime<Utc>) -> DisplayPayload {
        let epoch = now.timestamp().max(0) as u64;
        let cycle_second = rotation::cycle_second(epoch);
        let st = self.state.lock().expect("lanes mutex poisoned");

        if rotation::in_bulletin_phase(cycle_second) {
            let shown = st.bulletins.data.len().min(DISPLAY_BULLETINS);
            if shown == 0 {
                return DisplayPayload::Bulletin {
                    item: None,
                    message: Some(WAITING_FOR_DATA.to_string()),
                };
            }
            let slot = rotation::bulletin_slot(cycle_second, shown);
            DisplayPayload::Bulletin {
                item: Some(st.bulletins.data[slot].clone()),
                message: None,
            }
        } else {
            DisplayPayload::Market {
                indices: st.indices.data.clone(),
                sectors: st.sectors.data.clone(),
            }
        }
    }

    pub fn display_content(&self) -> DisplayPayload {
        self.display_content_at(Utc::now())
    }

    pub fn indices(&self) -> Vec<IndexQuote> {
        self.state.lock().expect("lanes mutex poisoned").indices.data.clone()
    }

    pub fn sectors(&self) -> Vec<SectorMover> {
        self.state.lock().expect("lanes mutex poisoned").sectors.data.clone()
    }

    pub fn bulletins(&self) -> Vec<Bulletin> {
        self.state.lock().expect("lanes mutex poisoned").bulletins.data.clone()
    }

    pub fn status(&self) -> LanesStatus {
        let st = self.state.lock().expect("lanes mutex poisoned");
        let lane = |count: usize, last: u64, interval: u64| LaneStatus {
            count,
            last_update: (last > 0).then_some(last),
            refresh_interval_secs: interval,
        };
        LanesStatus {
            indices: lane(
                st.indices.data.len(),
                st.indices.last_update,
                self.cfg.indices_interval_secs,
            ),
            sectors: lane(
                st.sectors.data.len(),
                st.sectors.last_update,
                self.cfg.sectors_interval_secs,
            ),
            bulletins: lane(
                st.bulletins.data.len(),
                st.bulletins.last_update,
                self.cfg.bulletins_interval_secs,
            ),
            tick_secs: self.cfg.tick_secs,
        }
    }

    /// Spawn the coarse tick loop. No-op if already started.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock().expect("lanes task mutex poisoned");
        if slot.is_some() {
            tracing::warn!("lanes tick task already running");
            return;
        }
        let pool = Arc::clone(self);
        *slot = Some(PeriodicTask::spawn(
            "lanes-tick",
            Duration::from_secs(self.cfg.tick_secs),
            move || {
                let pool = pool.clone();
                async move {
                    pool.tick().await;
                }
            },
        ));
    }

    pub async fn stop(&self) {
        let task = self.task.lock().expect("lanes task mutex poisoned").take();
        if let Some(task) = task {
            task.stop().await;
        }
    }
}

/// Indices merge policy: one quote per index name, newer capture wins,
/// entries older than `ttl_secs` drop out, newest first, bounded.
pub fn merge_indices(
    now: DateTime<Utc>,
    existing: Vec<IndexQuote>,
    incoming: Vec<IndexQuote>,
    ttl_secs: u64,
    cap: usize,
) -> Vec<IndexQuote> {
    let mut by_name: std::collections::HashMap<String, IndexQuote> = std::collections::HashMap::new();
    for q in existing.into_iter().chain(incoming) {
        match by_name.get(&q.name) {
            Some(held) if held.captured_at >= q.captured_at => {}
            _ => {
                by_name.insert(q.name.clone(), q);
            }
        }
    }
    let mut merged: Vec<IndexQuote> = by_name
        .into_values()
        .filter(|q| now.signed_duration_since(q.captured_at).num_seconds() <= ttl_secs as i64)
        .collect();
    merged.sort_by(|a, b| b.captured_at.cmp(&a.captured_at).then_with(|| a.name.cmp(&b.name)));
    merged.truncate(cap);
    merged
}

/// Bulletin windowing: parse each record's `HH:MM:SS` against today's date,
/// drop unparseable times (logged, never defaulted — a sentinel time could
/// masquerade as fresh), drop anything older than the window, treat times
/// further than `FUTURE_SKEW_SECS` ahead of now as yesterday's and drop them
/// too, then sort newest first and cap. Pure; the caller pins `now` in tests.
pub fn window_bulletins(
    now: DateTime<Utc>,
    raw: Vec<RawBulletin>,
    window_secs: u64,
    cap: usize,
) -> Vec<Bulletin> {
    let now_naive = now.naive_utc();
    let today = now_naive.date();

    let mut parsed: Vec<(chrono::NaiveDateTime, Bulletin)> = Vec::with_capacity(raw.len());
    for rb in raw {
        let time = match NaiveTime::parse_from_str(rb.time_text.trim(), "%H:%M:%S") {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(time = %rb.time_text, error = %e, "unparseable bulletin time, skipping");
                counter!("lane_bulletin_parse_skips_total").increment(1);
                continue;
            }
        };
        let at = today.and_time(time);
        let age = now_naive.signed_duration_since(at).num_seconds();
        if age < -FUTURE_SKEW_SECS {
            // Time-of-day ahead of the clock: a record from before midnight.
            tracing::debug!(time = %rb.time_text, "bulletin time ahead of now, treating as stale");
            continue;
        }
        if age > window_secs as i64 {
            continue;
        }
        parsed.push((
            at,
            Bulletin {
                text: rb.text,
                time: time.format("%H:%M:%S").to_string(),
                auxiliary: rb.auxiliary,
            },
        ));
    }

    parsed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.text.cmp(&b.1.text)));
    parsed.into_iter().take(cap).map(|(_, b)| b).collect()
}
