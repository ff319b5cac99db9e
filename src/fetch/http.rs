// src/fetch/http.rs
//
// Generic rule-driven HTTP fetcher. Field extraction for a concrete source
// lives entirely in its configured rules (regexes with named groups), so
// adding or fixing a source is a config change, not a code change.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use regex::Regex;

use crate::config::SourceEntry;
use crate::fetch::{normalize_title, resolve_url, Fetcher, RawItem};

/// Per-source fetch budget; a stuck endpoint must not stall a refresh cycle.
const FETCH_TIMEOUT_SECS: u64 = 10;
/// Cap per source, so one chatty endpoint cannot crowd out the rest.
const MAX_ITEMS_PER_SOURCE: usize = 20;
/// Shorter fragments are navigation labels, not headlines.
const MIN_TITLE_CHARS: usize = 10;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Shared client settings for every outbound fetch (news sources and lane
/// feeds alike): bounded timeout, browser UA.
pub(crate) fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .context("building http client")
}

pub struct HttpFetcher {
    entry: SourceEntry,
    rules: Vec<Regex>,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(entry: SourceEntry) -> Result<Self> {
        let rules = entry
            .rules
            .iter()
            .map(|r| Regex::new(r).with_context(|| format!("rule for source '{}'", entry.name)))
            .collect::<Result<Vec<_>>>()?;
        let client = build_client()?;
        Ok(Self {
            entry,
            rules,
            client,
        })
    }

    /// Try each extraction rule in order; the first one that yields any
    /// matches wins, mirroring how selector lists are probed per source.
    fn extract(&self, body: &str) -> Vec<RawItem> {
        for rule in &self.rules {
            let items = self.extract_with(rule, body);
            if !items.is_empty() {
                tracing::debug!(
                    source = %self.entry.name,
                    rule = %rule.as_str(),
                    count = items.len(),
                    "extraction rule matched"
                );
                return items;
            }
        }
        tracing::warn!(source = %self.entry.name, "no extraction rule matched");
        Vec::new()
    }

    fn extract_with(&self, rule: &Regex, body: &str) -> Vec<RawItem> {
        let mut out = Vec::new();
        for caps in rule.captures_iter(body) {
            let title = match caps.name("title") {
                Some(m) => normalize_title(m.as_str()),
                None => continue,
            };
            if title.chars().count() < MIN_TITLE_CHARS {
                continue;
            }
            let url = caps
                .name("href")
                .map(|m| resolve_url(&self.entry.endpoint, m.as_str().trim()))
                .unwrap_or_default();
            out.push(RawItem {
                title,
                url,
                published_at: caps.name("time").map(|m| m.as_str().trim().to_string()),
                auxiliary: caps.name("aux").map(|m| normalize_title(m.as_str())),
            });
            if out.len() >= MAX_ITEMS_PER_SOURCE {
                break;
            }
        }
        out
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self) -> Result<Vec<RawItem>> {
        let body = self
            .client
            .get(&self.entry.endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {}", self.entry.endpoint))?
            .text()
            .await
            .context("reading response body")?;

        let items = self.extract(&body);
        counter!("fetch_items_total").increment(items.len() as u64);
        Ok(items)
    }

    fn source(&self) -> &str {
        &self.entry.name
    }
}
