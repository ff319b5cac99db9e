//! Aggregated content record and its wire shape.
//!
//! `Item` is immutable after construction: refresh cycles replace records,
//! they never update them in place. Dedup identity is the `title` alone;
//! `id` exists only so external clients can tell payloads apart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::fetch::RawItem;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    /// When this process observed the item (ISO-8601 on the wire).
    #[serde(rename = "timestamp")]
    pub captured_at: DateTime<Utc>,
    /// Source-reported publish time, advisory only. Format is source-dependent.
    #[serde(rename = "news_time", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    /// Free-form enrichment, e.g. related market movers.
    #[serde(rename = "stock_info", skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<String>,
}

impl Item {
    pub fn new(title: &str, url: &str, source: &str, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: derive_id(source, title, captured_at),
            title: title.to_string(),
            url: url.to_string(),
            source: source.to_string(),
            captured_at,
            published_at: None,
            auxiliary: None,
        }
    }

    /// Stamp a fetched record with its capture time and origin label.
    pub fn from_raw(raw: RawItem, source: &str, captured_at: DateTime<Utc>) -> Self {
        let mut item = Self::new(&raw.title, &raw.url, source, captured_at);
        item.published_at = raw.published_at.filter(|s| !s.is_empty());
        item.auxiliary = raw.auxiliary.filter(|s| !s.is_empty());
        item
    }
}

/// Deterministic id from `(source, title, capture epoch)`. Never used for
/// equality; dedup compares titles only.
fn derive_id(source: &str, title: &str, captured_at: DateTime<Utc>) -> String {
    let epoch = captured_at.timestamp();
    let digest = Sha256::digest(format!("{source}|{title}|{epoch}").as_bytes());
    let mut hex = String::with_capacity(12);
    for b in digest.iter().take(6) {
        hex.push_str(&format!("{b:02x}"));
    }
    format!("{source}_{hex}_{epoch}")
}
