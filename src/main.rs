//! Wirefeed — Binary Entrypoint
//! Boots the aggregation pools and the Axum query surface: load the source
//! catalogue, start the refresh schedulers, serve read-only snapshots.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wirefeed::api::{create_router, AppState};
use wirefeed::config;
use wirefeed::fetch::http::HttpFetcher;
use wirefeed::fetch::Fetcher;
use wirefeed::lanes::feeds::{HttpBulletinsFeed, HttpIndicesFeed, HttpSectorsFeed, NullFeed};
use wirefeed::lanes::{
    BulletinsFeed, IndicesFeed, LanesCfg, MarketFeeds, MultiLanePool, SectorsFeed,
};
use wirefeed::pool::{ContentPool, PoolCfg};

const ENV_PORT: &str = "WIREFEED_PORT";
const DEFAULT_PORT: u16 = 8765;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wirefeed=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn build_news_pool(cfg: &config::SourcesConfig) -> Arc<ContentPool> {
    let mut fetchers: Vec<Arc<dyn Fetcher>> = Vec::new();
    let mut keys = Vec::new();
    for (key, entry) in cfg.enabled_entries() {
        match HttpFetcher::new(entry) {
            Ok(f) => {
                fetchers.push(Arc::new(f));
                keys.push(key);
            }
            Err(e) => tracing::warn!(source = %key, error = ?e, "skipping misconfigured source"),
        }
    }
    tracing::info!(sources = ?keys, "news pool sources");
    Arc::new(ContentPool::new(PoolCfg::default(), keys, fetchers))
}

fn build_market_pool(cfg: &config::SourcesConfig) -> Arc<MultiLanePool> {
    let indices: Arc<dyn IndicesFeed> = match &cfg.market.indices {
        Some(e) => match HttpIndicesFeed::new(e) {
            Ok(f) => Arc::new(f),
            Err(err) => {
                tracing::warn!(error = ?err, "bad indices feed config, lane stays empty");
                Arc::new(NullFeed)
            }
        },
        None => Arc::new(NullFeed),
    };
    let sectors: Arc<dyn SectorsFeed> = match &cfg.market.sectors {
        Some(e) => match HttpSectorsFeed::new(e) {
            Ok(f) => Arc::new(f),
            Err(err) => {
                tracing::warn!(error = ?err, "bad sectors feed config, lane stays empty");
                Arc::new(NullFeed)
            }
        },
        None => Arc::new(NullFeed),
    };
    let bulletins: Arc<dyn BulletinsFeed> = match &cfg.market.bulletins {
        Some(e) => match HttpBulletinsFeed::new(e) {
            Ok(f) => Arc::new(f),
            Err(err) => {
                tracing::warn!(error = ?err, "bad bulletins feed config, lane stays empty");
                Arc::new(NullFeed)
            }
        },
        None => Arc::new(NullFeed),
    };

    Arc::new(MultiLanePool::new(
        LanesCfg::default(),
        MarketFeeds {
            indices,
            sectors,
            bulletins,
        },
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let sources = config::load_sources_default().unwrap_or_else(|e| {
        tracing::warn!(error = ?e, "config load failed, using default catalogue");
        config::default_catalogue()
    });

    let news = build_news_pool(&sources);
    let market = build_market_pool(&sources);
    news.start();
    market.start();

    let port = std::env::var(ENV_PORT)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "wirefeed listening");

    let router = create_router(AppState {
        news: news.clone(),
        market: market.clone(),
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving http")?;

    news.stop().await;
    market.stop().await;
    Ok(())
}
