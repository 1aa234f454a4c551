//! External source registry
//!
//! Provides the built-in list of intelligence sources with their declared
//! hourly rate limits and reliability.

use serde::{Deserialize, Serialize};

use crate::{clamp_unit, SourceType};

/// A configured intelligence source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier
    pub id: String,
    /// Endpoint fetched with HTTP GET
    pub url: String,
    /// Response shape
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Maximum calls in any sliding one-hour window
    pub rate_limit_per_hour: u32,
    /// Estimated reliability (0.0 - 1.0)
    pub reliability: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn new(id: &str, url: &str, source_type: SourceType) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            source_type,
            rate_limit_per_hour: 60,
            reliability: 0.5,
            enabled: true,
        }
    }

    pub fn with_rate_limit(mut self, per_hour: u32) -> Self {
        self.rate_limit_per_hour = per_hour;
        self
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = clamp_unit(reliability);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Built-in sources used without a configuration file
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "hackernews",
            "https://hn.algolia.com/api/v1/search_by_date?tags=story&query=AI",
            SourceType::Technical,
        )
        .with_rate_limit(300)
        .with_reliability(0.75),
        SourceConfig::new(
            "reddit-technology",
            "https://www.reddit.com/r/technology/top.json?t=day&limit=25",
            SourceType::Social,
        )
        .with_rate_limit(60)
        .with_reliability(0.55),
        SourceConfig::new(
            "github-trending",
            "https://api.github.com/search/repositories?q=stars:>500+pushed:>2024-01-01&sort=stars",
            SourceType::Technical,
        )
        .with_rate_limit(10)
        .with_reliability(0.8),
        SourceConfig::new(
            "techcrunch",
            "https://techcrunch.com/feed/",
            SourceType::News,
        )
        .with_rate_limit(30)
        .with_reliability(0.85),
        SourceConfig::new(
            "producthunt-reviews",
            "https://www.producthunt.com/feed",
            SourceType::Reviews,
        )
        .with_rate_limit(20)
        .with_reliability(0.6),
        SourceConfig::new(
            "alpha-vantage-news",
            "https://www.alphavantage.co/query?function=NEWS_SENTIMENT&topics=technology&apikey=demo",
            SourceType::Financial,
        )
        .with_rate_limit(5)
        .with_reliability(0.9),
    ]
}

/// Sources in descending order of reliability
pub fn sources_by_reliability(sources: &[SourceConfig]) -> Vec<&SourceConfig> {
    let mut sorted: Vec<_> = sources.iter().filter(|s| s.enabled).collect();
    sorted.sort_by(|a, b| b.reliability.total_cmp(&a.reliability));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources_valid() {
        let sources = default_sources();
        assert!(sources.len() >= 5);
        for source in &sources {
            assert!((0.0..=1.0).contains(&source.reliability));
            assert!(source.rate_limit_per_hour > 0);
            assert!(source.url.starts_with("https://"));
        }
    }

    #[test]
    fn test_sorted_by_reliability_skips_disabled() {
        let sources = vec![
            SourceConfig::new("a", "https://a", SourceType::News).with_reliability(0.2),
            SourceConfig::new("b", "https://b", SourceType::News).with_reliability(0.9),
            SourceConfig::new("c", "https://c", SourceType::News)
                .with_reliability(1.0)
                .disabled(),
        ];
        let ids: Vec<_> = sources_by_reliability(&sources).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_source_toml_shape() {
        let json = r#"{"id":"x","url":"https://x","type":"financial","rate_limit_per_hour":5,"reliability":0.9}"#;
        let source: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(source.source_type, SourceType::Financial);
        assert!(source.enabled);
    }
}
