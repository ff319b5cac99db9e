// src/fetch/mod.rs
pub mod http;

use anyhow::Result;

/// One candidate record as a source reports it, before capture-stamping.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub url: String,
    pub published_at: Option<String>,
    pub auxiliary: Option<String>,
}

/// Capability boundary for one source. "No results" is `Ok(vec![])`;
/// `Err` is reserved for network/parse failures, which the pool logs and
/// absorbs — a bad source contributes zero items and never aborts a cycle.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawItem>>;
    fn source(&self) -> &str;
}

/// Normalize a scraped title: entity-decode, strip tags, collapse whitespace.
pub fn normalize_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Resolve a possibly-relative href against the source endpoint.
/// Already-absolute URLs pass through; empty hrefs stay empty.
pub fn resolve_url(endpoint: &str, href: &str) -> String {
    if href.is_empty() || href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix('/') {
        // scheme://host from the endpoint
        if let Some(scheme_end) = endpoint.find("://") {
            let after = &endpoint[scheme_end + 3..];
            let host_end = after.find('/').map(|i| scheme_end + 3 + i).unwrap_or(endpoint.len());
            return format!("{}/{}", &endpoint[..host_end], rest);
        }
    }
    format!("{}/{}", endpoint.trim_end_matches('/'), href)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_title_strips_tags_and_entities() {
        let s = "  <b>Fed&nbsp;holds</b>\n rates  ";
        assert_eq!(normalize_title(s), "Fed holds rates");
    }

    #[test]
    fn absolute_hrefs_pass_through() {
        assert_eq!(
            resolve_url("https://news.example.com", "https://other/x"),
            "https://other/x"
        );
    }

    #[test]
    fn root_relative_hrefs_join_to_host() {
        assert_eq!(
            resolve_url("https://news.example.com/section/tech", "/p/123"),
            "https://news.example.com/p/123"
        );
    }

    #[test]
    fn bare_relative_hrefs_join_to_endpoint() {
        assert_eq!(
            resolve_url("https://news.example.com/", "p/123"),
            "https://news.example.com/p/123"
        );
    }

    #[test]
    fn empty_href_stays_empty() {
        assert_eq!(resolve_url("https://news.example.com", ""), "");
    }
}
