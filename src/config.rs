// src/config.rs
//
// Source-list configuration. Loaded once at startup; the pools never see a
// config change for the process lifetime (no hot reload).

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "WIREFEED_SOURCES_PATH";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct SourceEntry {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub name: String,
    pub endpoint: String,
    /// Ordered extraction rules: regexes with named groups `title` and
    /// optionally `href`, `time`, `aux`. Probed in order, first hit wins.
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub icon: String,
}

fn default_enabled() -> bool {
    true
}

/// One lane feed: an endpoint plus a single extraction rule (regex with the
/// named groups that lane expects).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub endpoint: String,
    pub rule: String,
}

/// Optional market-lane feeds. A missing entry leaves that lane empty.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MarketConfig {
    pub indices: Option<FeedEntry>,
    pub sectors: Option<FeedEntry>,
    pub bulletins: Option<FeedEntry>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
pub struct SourcesConfig {
    pub sources: BTreeMap<String, SourceEntry>,
    #[serde(default)]
    pub market: MarketConfig,
}

impl SourcesConfig {
    /// Only the `enabled = true` subset reaches the pools.
    pub fn enabled_entries(&self) -> Vec<(String, SourceEntry)> {
        self.sources
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect()
    }

    pub fn enabled_keys(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Load sources from an explicit path. Supports TOML or JSON.
pub fn load_sources_from(path: &Path) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load sources using env var + fallbacks:
/// 1) $WIREFEED_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) compiled-in default catalogue
pub fn load_sources_default() -> Result<SourcesConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("{ENV_PATH} points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(default_catalogue())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<SourcesConfig> {
    if hint_ext == "toml" {
        if let Ok(v) = toml::from_str::<SourcesConfig>(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<SourcesConfig>(s) {
        return Ok(v);
    }
    if hint_ext != "toml" {
        if let Ok(v) = toml::from_str::<SourcesConfig>(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported sources format"))
}

/// The stock catalogue the service ships with, all enabled. A config file
/// replaces this wholesale.
pub fn default_catalogue() -> SourcesConfig {
    let mut sources = BTreeMap::new();
    let mut add = |key: &str, name: &str, endpoint: &str, icon: &str, rules: &[&str]| {
        sources.insert(
            key.to_string(),
            SourceEntry {
                enabled: true,
                name: name.to_string(),
                endpoint: endpoint.to_string(),
                rules: rules.iter().map(|s| s.to_string()).collect(),
                icon: icon.to_string(),
            },
        );
    };

    let anchor = r#"<a[^>]*href="(?P<href>[^"]+)"[^>]*>\s*(?P<title>[^<]{10,200})\s*</a>"#;

    add(
        "kr36",
        "36kr",
        "https://36kr.com",
        "💼",
        &[
            r#"<a[^>]*href="(?P<href>/p/[^"]+)"[^>]*>\s*(?P<title>[^<]{10,200})\s*</a>"#,
            anchor,
        ],
    );
    add(
        "techcrunch",
        "TechCrunch",
        "https://techcrunch.com",
        "🚀",
        &[
            r#"<h2[^>]*><a[^>]*href="(?P<href>[^"]+)"[^>]*>(?P<title>[^<]{10,200})</a></h2>"#,
            anchor,
        ],
    );
    add("huxiu", "虎嗅", "https://www.huxiu.com", "🦆", &[anchor]);
    add("tmtpost", "钛媒体", "https://www.tmtpost.com", "🔧", &[anchor]);
    add("leiphone", "雷锋网", "https://www.leiphone.com", "⚡", &[anchor]);
    add(
        "cls_telegraph",
        "财联社电报",
        "https://www.cls.cn/telegraph",
        "📈",
        &[
            r#"<a[^>]*href="(?P<href>[^"]*/telegraph/[^"]+)"[^>]*>\s*(?P<title>[^<]{10,200})\s*</a>"#,
            anchor,
        ],
    );
    add(
        "cls_finance",
        "财联社盘面",
        "https://www.cls.cn/subject/1103",
        "💹",
        &[
            r#"<a[^>]*href="(?P<href>[^"]*/detail/[^"]+)"[^>]*>\s*(?P<title>[^<]{10,200})\s*</a>"#,
            anchor,
        ],
    );
    add(
        "cls_depth",
        "财联社深度",
        "https://www.cls.cn/depth?id=1000",
        "📊",
        &[
            r#"<a[^>]*href="(?P<href>[^"]*/depth/[^"]+)"[^>]*>\s*(?P<title>[^<]{10,200})\s*</a>"#,
            anchor,
        ],
    );

    let market = MarketConfig {
        indices: Some(FeedEntry {
            endpoint: "https://www.cls.cn/finance".into(),
            rule: r#"<div class="index-item">\s*<span[^>]*>(?P<name>[^<]+)</span>\s*<span[^>]*>(?P<value>[\d.,]+)</span>\s*<span[^>]*>(?P<change>[+-]?[\d.]+%?)</span>"#.into(),
        }),
        sectors: Some(FeedEntry {
            endpoint: "https://www.cls.cn/subject/1103".into(),
            rule: r#"<div class="plate-item">\s*<span[^>]*>(?P<name>[^<]+)</span>\s*<span[^>]*>(?P<change>[+-]?[\d.]+%?)</span>"#.into(),
        }),
        bulletins: Some(FeedEntry {
            endpoint: "https://www.cls.cn/telegraph".into(),
            rule: r#"<span class="telegraph-time-box">(?P<time>\d{2}:\d{2}:\d{2})</span>\s*<span[^>]*>(?P<text>[^<]+)</span>"#.into(),
        }),
    };

    SourcesConfig { sources, market }
}
