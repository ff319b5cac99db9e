// tests/pool_refresh.rs
//
// Refresh-cycle invariants for the news pool: dedup, expiry, bound, and
// one-bad-source isolation. Fetchers are scripted so each cycle's input
// and clock are pinned.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};

use wirefeed::fetch::{Fetcher, RawItem};
use wirefeed::pool::{ContentPool, PoolCfg};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn raw(title: &str, url: &str) -> RawItem {
    RawItem {
        title: title.into(),
        url: url.into(),
        published_at: None,
        auxiliary: None,
    }
}

/// Returns the next scripted response per call; `Ok(vec![])` once exhausted.
struct ScriptedFetcher {
    source: String,
    script: Mutex<VecDeque<Result<Vec<RawItem>>>>,
}

impl ScriptedFetcher {
    fn new(source: &str, script: Vec<Result<Vec<RawItem>>>) -> Arc<dyn Fetcher> {
        Arc::new(Self {
            source: source.into(),
            script: Mutex::new(script.into_iter().collect()),
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<Vec<RawItem>> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn source(&self) -> &str {
        &self.source
    }
}

struct AlwaysFails(String);

#[async_trait::async_trait]
impl Fetcher for AlwaysFails {
    async fn fetch(&self) -> Result<Vec<RawItem>> {
        Err(anyhow!("connection refused"))
    }

    fn source(&self) -> &str {
        &self.0
    }
}

fn cfg() -> PoolCfg {
    PoolCfg {
        max_size: 100,
        ttl_secs: 6 * 3600,
        refresh_interval_secs: 60,
        rotation_period_secs: 5,
    }
}

#[tokio::test]
async fn failing_source_does_not_spoil_the_batch() {
    let good = ScriptedFetcher::new(
        "good",
        vec![Ok(vec![raw("first good headline", "u1"), raw("second good headline", "u2")])],
    );
    let bad: Arc<dyn Fetcher> = Arc::new(AlwaysFails("bad".into()));

    let pool = ContentPool::new(cfg(), vec!["good".into(), "bad".into()], vec![good, bad]);
    let report = pool.refresh_at(ts(1_000_000)).await;

    assert_eq!(report.fetched_total(), 2);
    assert_eq!(report.failed_sources(), vec!["bad"]);

    let items = pool.snapshot();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.source == "good"));
}

#[tokio::test]
async fn duplicate_title_across_cycles_keeps_newer_capture() {
    let f = ScriptedFetcher::new(
        "wire",
        vec![
            Ok(vec![raw("the same headline", "old-url")]),
            Ok(vec![raw("the same headline", "new-url")]),
        ],
    );
    let pool = ContentPool::new(cfg(), vec!["wire".into()], vec![f]);

    pool.refresh_at(ts(1_000_000)).await;
    pool.refresh_at(ts(1_000_060)).await;

    let items = pool.snapshot();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].captured_at, ts(1_000_060));
    assert_eq!(items[0].url, "new-url");
}

#[tokio::test]
async fn entries_older_than_ttl_are_expired_on_refresh() {
    let f = ScriptedFetcher::new(
        "wire",
        vec![
            Ok(vec![raw("an early headline", "")]),
            Ok(vec![raw("a much later headline", "")]),
        ],
    );
    let pool = ContentPool::new(cfg(), vec!["wire".into()], vec![f]);

    let t0 = 1_000_000;
    pool.refresh_at(ts(t0)).await;
    pool.refresh_at(ts(t0 + 6 * 3600 + 10)).await;

    let items = pool.snapshot();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "a much later headline");
}

#[tokio::test]
async fn pool_never_exceeds_max_size_and_stays_sorted() {
    let batch: Vec<RawItem> = (0..10)
        .map(|i| raw(&format!("generated headline {i}"), ""))
        .collect();
    let f = ScriptedFetcher::new("wire", vec![Ok(batch)]);
    let small = PoolCfg {
        max_size: 3,
        ..cfg()
    };
    let pool = ContentPool::new(small, vec!["wire".into()], vec![f]);
    pool.refresh_at(ts(1_000_000)).await;

    let items = pool.snapshot();
    assert_eq!(items.len(), 3);
    for w in items.windows(2) {
        assert!(w[0].captured_at >= w[1].captured_at);
    }
}

#[tokio::test]
async fn refresh_with_no_fetchers_is_a_clean_no_op() {
    let pool = ContentPool::new(cfg(), vec![], vec![]);
    let report = pool.refresh_at(ts(1_000_000)).await;
    assert!(report.outcomes.is_empty());
    assert!(pool.snapshot().is_empty());

    let status = pool.status();
    assert_eq!(status.count, 0);
    assert_eq!(status.last_refresh, Some(ts(1_000_000)));
}

#[tokio::test]
async fn rotating_is_deterministic_and_sweeps_the_pool() {
    let batch: Vec<RawItem> = (0..4)
        .map(|i| raw(&format!("rotating headline {i}"), ""))
        .collect();
    let f = ScriptedFetcher::new("wire", vec![Ok(batch)]);
    let pool = ContentPool::new(cfg(), vec!["wire".into()], vec![f]);
    pool.refresh_at(ts(1_000_000)).await;

    // same second, same item
    let a = pool.rotating_at(1_000_000).unwrap();
    let b = pool.rotating_at(1_000_000).unwrap();
    assert_eq!(a.id, b.id);

    // stepping by the rotation period visits all four items before repeating
    let start = 1_000_000 - (1_000_000 % 20); // aligned to k*R = 4*5
    let mut seen = Vec::new();
    for epoch in (start..start + 20).step_by(5) {
        seen.push(pool.rotating_at(epoch).unwrap().id);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 4);
    assert_eq!(
        pool.rotating_at(start).unwrap().id,
        pool.rotating_at(start + 20).unwrap().id
    );
}

#[tokio::test]
async fn random_sample_is_bounded_and_distinct() {
    let batch: Vec<RawItem> = (0..6)
        .map(|i| raw(&format!("sampled headline {i}"), ""))
        .collect();
    let f = ScriptedFetcher::new("wire", vec![Ok(batch)]);
    let pool = ContentPool::new(cfg(), vec!["wire".into()], vec![f]);
    pool.refresh_at(ts(1_000_000)).await;

    let sample = pool.random_sample(4);
    assert_eq!(sample.len(), 4);
    let mut ids: Vec<&str> = sample.iter().map(|i| i.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    // n larger than the pool clamps to the pool size
    assert_eq!(pool.random_sample(100).len(), 6);
}

#[tokio::test]
async fn empty_pool_reads_are_absent_not_errors() {
    let pool = ContentPool::new(cfg(), vec![], vec![]);
    assert!(pool.rotating_at(1_000_000).is_none());
    assert!(pool.random_sample(5).is_empty());
    assert_eq!(pool.status().count, 0);
    assert_eq!(pool.status().last_refresh, None);
}
