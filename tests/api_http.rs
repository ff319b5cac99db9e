// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, /status
// - GET /next (populated and empty pool shapes)
// - GET /random?count=N
// - GET /refresh fire-and-forget contract
// - GET /lanes/* snapshots

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use wirefeed::api::{create_router, AppState};
use wirefeed::fetch::{Fetcher, RawItem};
use wirefeed::lanes::feeds::NullFeed;
use wirefeed::lanes::{LanesCfg, MarketFeeds, MultiLanePool};
use wirefeed::pool::{ContentPool, PoolCfg};

const BODY_LIMIT: usize = 1024 * 1024;

struct FixedFetcher(Vec<RawItem>);

#[async_trait::async_trait]
impl Fetcher for FixedFetcher {
    async fn fetch(&self) -> Result<Vec<RawItem>> {
        Ok(self.0.clone())
    }

    fn source(&self) -> &str {
        "fixture"
    }
}

fn empty_market() -> Arc<MultiLanePool> {
    Arc::new(MultiLanePool::new(
        LanesCfg::default(),
        MarketFeeds {
            indices: Arc::new(NullFeed),
            sectors: Arc::new(NullFeed),
            bulletins: Arc::new(NullFeed),
        },
    ))
}

fn router_with(news: Arc<ContentPool>) -> Router {
    create_router(AppState {
        news,
        market: empty_market(),
    })
}

async fn populated_pool(n: usize) -> Arc<ContentPool> {
    let items: Vec<RawItem> = (0..n)
        .map(|i| RawItem {
            title: format!("fixture headline number {i}"),
            url: format!("https://example.com/{i}"),
            published_at: None,
            auxiliary: None,
        })
        .collect();
    let fetchers: Vec<Arc<dyn Fetcher>> = vec![Arc::new(FixedFetcher(items))];
    let pool = Arc::new(ContentPool::new(
        PoolCfg::default(),
        vec!["fixture".into()],
        fetchers,
    ));
    pool.refresh().await;
    pool
}

async fn get_json(app: Router, uri: &str) -> Json {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK, "GET {uri} should be 200");
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json")
}

#[tokio::test]
async fn api_health_returns_200() {
    let app = router_with(Arc::new(ContentPool::new(PoolCfg::default(), vec![], vec![])));
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_status_reports_count_sources_and_interval() {
    let app = router_with(populated_pool(3).await);
    let v = get_json(app, "/status").await;
    assert_eq!(v["count"], 3);
    assert_eq!(v["refresh_interval_secs"], 60);
    assert_eq!(v["sources"], serde_json::json!(["fixture"]));
    assert!(v.get("last_refresh").is_some());
}

#[tokio::test]
async fn api_next_returns_item_with_wire_fields() {
    let app = router_with(populated_pool(2).await);
    let v = get_json(app, "/next").await;
    for field in ["id", "title", "url", "source", "timestamp"] {
        assert!(v.get(field).is_some(), "missing '{field}'");
    }
}

#[tokio::test]
async fn api_next_on_empty_pool_reports_absence_not_error_status() {
    let app = router_with(Arc::new(ContentPool::new(PoolCfg::default(), vec![], vec![])));
    let v = get_json(app, "/next").await;
    assert_eq!(v["error"], "No news available");
}

#[tokio::test]
async fn api_random_honors_count_and_clamps() {
    let pool = populated_pool(5).await;

    let v = get_json(router_with(pool.clone()), "/random?count=2").await;
    assert_eq!(v.as_array().unwrap().len(), 2);

    let v = get_json(router_with(pool.clone()), "/random?count=50").await;
    assert_eq!(v.as_array().unwrap().len(), 5);

    // default count is 5
    let v = get_json(router_with(pool), "/random").await;
    assert_eq!(v.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn api_refresh_acknowledges_and_fills_the_pool() {
    let fetchers: Vec<Arc<dyn Fetcher>> = vec![Arc::new(FixedFetcher(vec![RawItem {
        title: "a freshly fetched headline".into(),
        url: String::new(),
        published_at: None,
        auxiliary: None,
    }]))];
    let pool = Arc::new(ContentPool::new(
        PoolCfg::default(),
        vec!["fixture".into()],
        fetchers,
    ));
    let v = get_json(router_with(pool.clone()), "/refresh").await;
    assert_eq!(v["message"], "Refresh started");

    // the spawned refresh is asynchronous; give it a moment to land
    for _ in 0..50 {
        if pool.status().count > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(pool.status().count, 1);
}

#[tokio::test]
async fn api_lane_endpoints_return_empty_snapshots_not_errors() {
    let app = router_with(Arc::new(ContentPool::new(PoolCfg::default(), vec![], vec![])));
    let v = get_json(app, "/lanes/indices").await;
    assert_eq!(v, serde_json::json!([]));

    let app = router_with(Arc::new(ContentPool::new(PoolCfg::default(), vec![], vec![])));
    let v = get_json(app, "/lanes/status").await;
    assert_eq!(v["indices"]["count"], 0);
    assert_eq!(v["bulletins"]["refresh_interval_secs"], 30);

    // /lanes/next uses the real clock, so the phase depends on when this
    // runs; both shapes must be well-formed and neither is an HTTP error.
    let app = router_with(Arc::new(ContentPool::new(PoolCfg::default(), vec![], vec![])));
    let v = get_json(app, "/lanes/next").await;
    match v["kind"].as_str() {
        Some("bulletin") => assert_eq!(v["message"], "waiting for data"),
        Some("market") => {
            assert_eq!(v["indices"], serde_json::json!([]));
            assert_eq!(v["sectors"], serde_json::json!([]));
        }
        other => panic!("unexpected payload kind {other:?}"),
    }
}
