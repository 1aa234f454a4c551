//! Rate-limited source fetcher
//!
//! Fetches every enabled source concurrently. A source over its hourly budget
//! is skipped, and a source that fails is logged and dropped; the caller
//! always gets whatever the other sources produced.

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info, warn};

use augur_core::{RawIntelligence, SourceConfig};

use crate::{backoff_delay, create_client, parse_payload, FetchError, HttpConfig, SlidingWindowLimiter};

/// Result of checking one source
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub reachable: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

pub struct SourceFetcher {
    sources: Vec<SourceConfig>,
    client: Client,
    http: HttpConfig,
    limiter: SlidingWindowLimiter,
}

impl SourceFetcher {
    pub fn new(sources: Vec<SourceConfig>, http: HttpConfig) -> Result<Self, FetchError> {
        let client = create_client(&http)?;
        Ok(Self {
            sources,
            client,
            http,
            limiter: SlidingWindowLimiter::hourly(),
        })
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Calls left in the current window for a source
    pub fn remaining_budget(&self, id: &str) -> Option<u32> {
        self.source(id)
            .map(|s| self.limiter.remaining(&s.id, s.rate_limit_per_hour))
    }

    /// Fetch enabled sources, optionally restricted to `source_ids`
    pub async fn ingest(&self, source_ids: Option<&[String]>) -> Vec<RawIntelligence> {
        use futures::stream::{self, StreamExt};

        let selected: Vec<&SourceConfig> = self
            .sources
            .iter()
            .filter(|s| s.enabled)
            .filter(|s| source_ids.map_or(true, |ids| ids.iter().any(|id| *id == s.id)))
            .collect();

        if let Some(ids) = source_ids {
            for id in ids {
                if self.source(id).is_none() {
                    warn!("Unknown source requested: {}", id);
                }
            }
        }

        debug!("Ingesting from {} sources", selected.len());

        let results: Vec<Vec<RawIntelligence>> = stream::iter(selected)
            .map(|source| async move {
                match self.ingest_source(source).await {
                    Ok(records) => records,
                    Err(FetchError::RateLimited(id)) => {
                        warn!("Source {} is at its hourly limit, skipping", id);
                        Vec::new()
                    }
                    Err(e) => {
                        warn!("Source {} failed: {}", source.id, e);
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(self.http.max_concurrent.max(1))
            .collect()
            .await;

        let records: Vec<RawIntelligence> = results.into_iter().flatten().collect();
        info!("Ingested {} raw records", records.len());
        records
    }

    async fn ingest_source(&self, source: &SourceConfig) -> Result<Vec<RawIntelligence>, FetchError> {
        if !self.limiter.try_acquire(&source.id, source.rate_limit_per_hour) {
            return Err(FetchError::RateLimited(source.id.clone()));
        }

        // Only a call that yields records consumes budget; any failure refunds the slot
        let fetched = self
            .fetch_with_retry(&source.url)
            .await
            .and_then(|body| parse_payload(source.source_type, &body));
        let fragments = match fetched {
            Ok(fragments) => fragments,
            Err(e) => {
                self.limiter.release(&source.id);
                return Err(e);
            }
        };
        debug!("Source {} returned {} fragments", source.id, fragments.len());

        let timestamp = Utc::now();
        Ok(fragments
            .into_iter()
            .map(|payload| {
                let mut raw = RawIntelligence::new(&source.id, source.source_type, payload)
                    .with_url(&source.url)
                    .with_reliability(source.reliability);
                raw.timestamp = timestamp;
                raw
            })
            .collect())
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.http.max_retries => {
                    let delay = backoff_delay(attempt);
                    debug!("Retrying {} in {:?} after: {}", url, delay, e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() && self.http.max_retries > 0 => {
                    debug!("Giving up on {}: {}", url, e);
                    return Err(FetchError::MaxRetries(self.http.max_retries));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// One GET against a source, outside the rate limit
    pub async fn check_source(&self, id: &str) -> Result<SourceStatus, FetchError> {
        let source = self
            .source(id)
            .ok_or_else(|| FetchError::UnknownSource(id.to_string()))?;

        let start = std::time::Instant::now();
        let outcome = self.client.get(&source.url).send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(match outcome {
            Ok(response) => SourceStatus {
                source_id: source.id.clone(),
                reachable: response.status().is_success(),
                status: Some(response.status().as_u16()),
                latency_ms,
                error: None,
            },
            Err(e) => SourceStatus {
                source_id: source.id.clone(),
                reachable: false,
                status: None,
                latency_ms,
                error: Some(e.to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use augur_core::SourceType;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpConfig {
        HttpConfig {
            max_retries: 0,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ingest_skips_source_over_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hn"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"hits":[{"title":"AI triage in hospitals"}]}"#),
            )
            .expect(2)
            .mount(&server)
            .await;

        let source = SourceConfig::new("hn", &format!("{}/hn", server.uri()), SourceType::Technical)
            .with_rate_limit(2)
            .with_reliability(0.7);
        let fetcher = SourceFetcher::new(vec![source], http()).unwrap();

        assert_eq!(fetcher.ingest(None).await.len(), 1);
        assert_eq!(fetcher.ingest(None).await.len(), 1);
        // Third call in the same hour is skipped without a request
        assert!(fetcher.ingest(None).await.is_empty());
        assert_eq!(fetcher.remaining_budget("hn"), Some(0));
    }

    #[tokio::test]
    async fn test_failed_source_is_isolated_and_refunded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"articles":[{"title":"Hospitals adopt AI"},{"title":"FDA clears device"}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ok = SourceConfig::new("ok", &format!("{}/ok", server.uri()), SourceType::News)
            .with_reliability(0.8);
        let down = SourceConfig::new("down", &format!("{}/down", server.uri()), SourceType::News)
            .with_rate_limit(3);
        let fetcher = SourceFetcher::new(vec![ok, down], http()).unwrap();

        let records = fetcher.ingest(None).await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source_id == "ok"));
        assert!(records.iter().all(|r| (r.reliability - 0.8).abs() < 1e-9));
        assert_eq!(fetcher.remaining_budget("down"), Some(3));
    }

    #[tokio::test]
    async fn test_unparseable_body_refunds_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json, not markup"))
            .mount(&server)
            .await;

        let source =
            SourceConfig::new("garbled", &format!("{}/garbled", server.uri()), SourceType::News)
                .with_rate_limit(2);
        let fetcher = SourceFetcher::new(vec![source], http()).unwrap();

        assert!(fetcher.ingest(None).await.is_empty());
        assert_eq!(fetcher.remaining_budget("garbled"), Some(2));
    }

    #[tokio::test]
    async fn test_ingest_selected_and_enabled_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"title":"x"}]"#))
            .mount(&server)
            .await;

        let a = SourceConfig::new("a", &format!("{}/a", server.uri()), SourceType::Social);
        let b = SourceConfig::new("b", &format!("{}/b", server.uri()), SourceType::Social);
        let c = SourceConfig::new("c", &format!("{}/c", server.uri()), SourceType::Social).disabled();
        let fetcher = SourceFetcher::new(vec![a, b, c], http()).unwrap();

        let only_b = fetcher.ingest(Some(&["b".to_string(), "c".to_string()])).await;
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].source_id, "b");

        let all = fetcher.ingest(None).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_source_check_does_not_consume_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let source = SourceConfig::new("p", &server.uri(), SourceType::News).with_rate_limit(1);
        let fetcher = SourceFetcher::new(vec![source], http()).unwrap();

        let status = fetcher.check_source("p").await.unwrap();
        assert!(status.reachable);
        assert_eq!(status.status, Some(204));
        assert_eq!(fetcher.remaining_budget("p"), Some(1));

        assert!(matches!(
            fetcher.check_source("missing").await,
            Err(FetchError::UnknownSource(_))
        ));
    }
}
