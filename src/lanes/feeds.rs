// src/lanes/feeds.rs
//
// Rule-driven HTTP feeds for the market lanes, mirroring the generic news
// fetcher: one regex with named groups per lane, extraction specifics live
// in config. A lane without a configured feed gets `NullFeed` and simply
// stays empty.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

use crate::config::FeedEntry;
use crate::fetch::http::build_client;
use crate::lanes::{
    BulletinsFeed, IndexSample, IndicesFeed, RawBulletin, SectorSample, SectorsFeed,
};

struct RuleFeed {
    endpoint: String,
    rule: Regex,
    client: reqwest::Client,
}

impl RuleFeed {
    fn new(entry: &FeedEntry) -> Result<Self> {
        Ok(Self {
            endpoint: entry.endpoint.clone(),
            rule: Regex::new(&entry.rule)
                .with_context(|| format!("feed rule for {}", entry.endpoint))?,
            client: build_client()?,
        })
    }

    async fn body(&self) -> Result<String> {
        self.client
            .get(&self.endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {}", self.endpoint))?
            .text()
            .await
            .context("reading feed body")
    }
}

/// Parse a numeric capture, tolerating thousands separators, leading `+`
/// and a trailing `%`. A record with an unparseable number is skipped and
/// logged; its siblings are unaffected.
fn parse_num(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', "");
    let cleaned = cleaned.trim_start_matches('+').trim_end_matches('%');
    match cleaned.parse::<f64>() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(value = s, error = %e, "unparseable numeric field, skipping record");
            None
        }
    }
}

pub struct HttpIndicesFeed(RuleFeed);

impl HttpIndicesFeed {
    pub fn new(entry: &FeedEntry) -> Result<Self> {
        Ok(Self(RuleFeed::new(entry)?))
    }
}

#[async_trait]
impl IndicesFeed for HttpIndicesFeed {
    async fn fetch_indices(&self) -> Result<Vec<IndexSample>> {
        let body = self.0.body().await?;
        let mut out = Vec::new();
        for caps in self.0.rule.captures_iter(&body) {
            let (Some(name), Some(value), Some(change)) =
                (caps.name("name"), caps.name("value"), caps.name("change"))
            else {
                continue;
            };
            let (Some(value), Some(change_pct)) =
                (parse_num(value.as_str()), parse_num(change.as_str()))
            else {
                continue;
            };
            out.push(IndexSample {
                name: name.as_str().trim().to_string(),
                value,
                change_pct,
            });
        }
        Ok(out)
    }
}

pub struct HttpSectorsFeed(RuleFeed);

impl HttpSectorsFeed {
    pub fn new(entry: &FeedEntry) -> Result<Self> {
        Ok(Self(RuleFeed::new(entry)?))
    }
}

#[async_trait]
impl SectorsFeed for HttpSectorsFeed {
    async fn fetch_sectors(&self) -> Result<Vec<SectorSample>> {
        let body = self.0.body().await?;
        let mut out = Vec::new();
        for caps in self.0.rule.captures_iter(&body) {
            let (Some(name), Some(change)) = (caps.name("name"), caps.name("change")) else {
                continue;
            };
            let Some(change_pct) = parse_num(change.as_str()) else {
                continue;
            };
            out.push(SectorSample {
                name: name.as_str().trim().to_string(),
                change_pct,
            });
        }
        Ok(out)
    }
}

pub struct HttpBulletinsFeed(RuleFeed);

impl HttpBulletinsFeed {
    pub fn new(entry: &FeedEntry) -> Result<Self> {
        Ok(Self(RuleFeed::new(entry)?))
    }
}

#[async_trait]
impl BulletinsFeed for HttpBulletinsFeed {
    async fn fetch_bulletins(&self) -> Result<Vec<RawBulletin>> {
        let body = self.0.body().await?;
        let mut out = Vec::new();
        for caps in self.0.rule.captures_iter(&body) {
            let (Some(time), Some(text)) = (caps.name("time"), caps.name("text")) else {
                continue;
            };
            let text = crate::fetch::normalize_title(text.as_str());
            if text.is_empty() {
                continue;
            }
            out.push(RawBulletin {
                text,
                time_text: time.as_str().trim().to_string(),
                auxiliary: caps
                    .name("aux")
                    .map(|m| crate::fetch::normalize_title(m.as_str()))
                    .filter(|s| !s.is_empty()),
            });
        }
        Ok(out)
    }
}

/// Stand-in for an unconfigured lane: always "no results", never an error.
pub struct NullFeed;

#[async_trait]
impl IndicesFeed for NullFeed {
    async fn fetch_indices(&self) -> Result<Vec<IndexSample>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl SectorsFeed for NullFeed {
    async fn fetch_sectors(&self) -> Result<Vec<SectorSample>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl BulletinsFeed for NullFeed {
    async fn fetch_bulletins(&self) -> Result<Vec<RawBulletin>> {
        Ok(Vec::new())
    }
}
