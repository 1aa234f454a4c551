//! Streaming Batch Generator
//!
//! Splits a trend request into one batch per category, generates them all at
//! once and yields each batch as soon as it finishes, in completion order. A
//! category that fails still yields a batch, carrying the error.

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use augur_agents::{parse_json, AgentError, CompletionOptions, SharedBackend};
use augur_core::{
    clamp_impact, clamp_unit, BatchProgress, CompanyProfile, Trend, TrendBatch, TrendCategory,
};

/// Called synchronously after every completed batch
pub type ProgressCallback = Box<dyn FnMut(&BatchProgress) + Send>;

/// Produces trends for one category
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn generate(
        &self,
        category: TrendCategory,
        count: usize,
        profile: Option<&CompanyProfile>,
    ) -> Result<Vec<Trend>, AgentError>;
}

pub type SharedTrendSource = Arc<dyn TrendSource>;

pub struct BatchGenerator {
    source: SharedTrendSource,
}

impl BatchGenerator {
    pub fn new(source: SharedTrendSource) -> Self {
        Self { source }
    }

    /// Lazily generate `total_count` trends split evenly across categories.
    ///
    /// Each category is asked for `ceil(total_count / 4)` trends, so the
    /// total may overshoot slightly.
    pub fn generate_batches(
        &self,
        total_count: usize,
        profile: Option<CompanyProfile>,
        mut on_progress: Option<ProgressCallback>,
    ) -> impl Stream<Item = TrendBatch> + Send + 'static {
        let source = Arc::clone(&self.source);

        stream! {
            let started = Instant::now();
            let per_category = total_count.div_ceil(TrendCategory::ALL.len());

            let mut pending: FuturesUnordered<_> = TrendCategory::ALL
                .into_iter()
                .map(|category| {
                    let source = Arc::clone(&source);
                    let profile = profile.clone();
                    async move {
                        let result = source.generate(category, per_category, profile.as_ref()).await;
                        (category, result)
                    }
                })
                .collect();

            let total_batches = pending.len();
            let mut completed = 0;

            while let Some((category, result)) = pending.next().await {
                completed += 1;
                let progress = BatchProgress::new(
                    total_batches,
                    completed,
                    started.elapsed().as_millis() as u64,
                );
                if let Some(callback) = on_progress.as_mut() {
                    callback(&progress);
                }

                let (trends, error) = match result {
                    Ok(mut trends) => {
                        trends.truncate(per_category);
                        debug!("Batch {} produced {} trends", category, trends.len());
                        (trends, None)
                    }
                    Err(e) => {
                        warn!("Batch {} failed: {}", category, e);
                        (Vec::new(), Some(e.to_string()))
                    }
                };

                yield TrendBatch {
                    batch_id: format!("{}-{}", category, completed),
                    trends,
                    category: Some(category),
                    progress: progress.progress,
                    is_complete: completed == total_batches,
                    error,
                };
            }
        }
    }
}

const TRENDS_SYSTEM_PROMPT: &str = r#"
You are a market research analyst. Identify current, concrete market trends.
Each trend needs a short title, a two-sentence description for business readers,
an impact score from 1 to 10, a confidence from 0 to 1, an adoption timeframe
and a few lowercase tags.
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrendsReply {
    trends: Vec<TrendReply>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrendReply {
    title: String,
    description: String,
    #[serde(alias = "impact")]
    impact_score: Option<f64>,
    confidence: Option<f64>,
    timeframe: String,
    tags: Vec<String>,
}

/// Trend source backed by a completion service
pub struct LlmTrendSource {
    backend: SharedBackend,
    options: CompletionOptions,
}

impl LlmTrendSource {
    pub fn new(backend: SharedBackend, options: CompletionOptions) -> Self {
        Self {
            backend,
            options: options.json(),
        }
    }
}

#[async_trait]
impl TrendSource for LlmTrendSource {
    async fn generate(
        &self,
        category: TrendCategory,
        count: usize,
        profile: Option<&CompanyProfile>,
    ) -> Result<Vec<Trend>, AgentError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let audience = profile
            .map(|p| format!("Tailor them to a {}.", p.describe()))
            .unwrap_or_default();
        let prompt = format!(
            "List {} {} trends. {}\nReturn JSON: {{\"trends\": [{{\"title\": \"..\", \"description\": \"..\", \
             \"impact_score\": 5, \"confidence\": 0.5, \"timeframe\": \"..\", \"tags\": [..]}}]}}",
            count, category, audience
        );

        let reply = self
            .backend
            .complete(TRENDS_SYSTEM_PROMPT, &prompt, &self.options)
            .await?;
        let parsed: TrendsReply = parse_json(&reply)?;

        let trends: Vec<Trend> = parsed
            .trends
            .into_iter()
            .filter(|t| !t.title.trim().is_empty())
            .map(|t| Trend {
                id: Uuid::new_v4().to_string(),
                title: t.title,
                description: t.description,
                category,
                impact_score: clamp_impact(t.impact_score.unwrap_or(5.0)),
                confidence: clamp_unit(t.confidence.unwrap_or(0.5)),
                timeframe: t.timeframe,
                tags: t.tags,
            })
            .collect();

        if trends.is_empty() {
            return Err(AgentError::Parse(format!("no {} trends in reply", category)));
        }
        Ok(trends)
    }
}

/// Trend source used when no completion backend is configured
pub struct UnavailableTrendSource;

#[async_trait]
impl TrendSource for UnavailableTrendSource {
    async fn generate(
        &self,
        _category: TrendCategory,
        _count: usize,
        _profile: Option<&CompanyProfile>,
    ) -> Result<Vec<Trend>, AgentError> {
        Err(AgentError::Unavailable("no completion backend configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use augur_agents::{LlmBackend, LlmError};
    use parking_lot::Mutex;

    struct FixedSource {
        failing: Option<TrendCategory>,
    }

    #[async_trait]
    impl TrendSource for FixedSource {
        async fn generate(
            &self,
            category: TrendCategory,
            count: usize,
            _profile: Option<&CompanyProfile>,
        ) -> Result<Vec<Trend>, AgentError> {
            if self.failing == Some(category) {
                return Err(AgentError::Unavailable("upstream down".into()));
            }
            // Over-deliver to check truncation
            Ok((0..count + 2)
                .map(|i| Trend {
                    id: format!("{}-{}", category, i),
                    title: format!("{} trend {}", category, i),
                    description: String::new(),
                    category,
                    impact_score: 5.0,
                    confidence: 0.5,
                    timeframe: "12 months".into(),
                    tags: vec![],
                })
                .collect())
        }
    }

    fn generator(failing: Option<TrendCategory>) -> BatchGenerator {
        BatchGenerator::new(Arc::new(FixedSource { failing }))
    }

    #[tokio::test]
    async fn test_twenty_trends_in_four_batches() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let callback: ProgressCallback = Box::new(move |p: &BatchProgress| sink.lock().push(*p));

        let batches: Vec<TrendBatch> = generator(None)
            .generate_batches(20, None, Some(callback))
            .collect()
            .await;

        assert_eq!(batches.len(), 4);
        let total: usize = batches.iter().map(|b| b.trends.len()).sum();
        assert!(total >= 20);
        assert!(batches.iter().all(TrendBatch::succeeded));
        assert!(batches.last().is_some_and(|b| b.is_complete && b.progress == 1.0));

        let reports = reports.lock();
        assert_eq!(reports.len(), 4);
        assert_eq!(reports.last().map(|p| p.progress), Some(1.0));
        assert_eq!(reports.last().map(|p| p.estimated_time_remaining_ms), Some(0));
        let completed: Vec<usize> = reports.iter().map(|p| p.completed_batches).collect();
        assert_eq!(completed, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_uneven_count_rounds_up() {
        let batches: Vec<TrendBatch> = generator(None).generate_batches(9, None, None).collect().await;
        assert!(batches.iter().all(|b| b.trends.len() == 3));
    }

    #[tokio::test]
    async fn test_one_failing_category() {
        let batches: Vec<TrendBatch> = generator(Some(TrendCategory::Regulatory))
            .generate_batches(20, None, None)
            .collect()
            .await;

        assert_eq!(batches.len(), 4);
        assert_eq!(batches.iter().filter(|b| b.succeeded()).count(), 3);
        let failed: Vec<&TrendBatch> = batches.iter().filter(|b| !b.succeeded()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].category, Some(TrendCategory::Regulatory));
        assert!(failed[0].trends.is_empty());
        assert!(failed[0].error.as_deref().is_some_and(|e| e.contains("upstream down")));
    }

    struct DelayedSource;

    #[async_trait]
    impl TrendSource for DelayedSource {
        async fn generate(
            &self,
            category: TrendCategory,
            _count: usize,
            _profile: Option<&CompanyProfile>,
        ) -> Result<Vec<Trend>, AgentError> {
            let delay_ms = match category {
                TrendCategory::Technology => 150,
                TrendCategory::Market => 10,
                TrendCategory::Consumer => 100,
                TrendCategory::Regulatory => 50,
            };
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_batches_arrive_in_completion_order() {
        let batches: Vec<TrendBatch> = BatchGenerator::new(Arc::new(DelayedSource))
            .generate_batches(8, None, None)
            .collect()
            .await;

        let order: Vec<Option<TrendCategory>> = batches.iter().map(|b| b.category).collect();
        assert_eq!(
            order,
            vec![
                Some(TrendCategory::Market),
                Some(TrendCategory::Regulatory),
                Some(TrendCategory::Consumer),
                Some(TrendCategory::Technology),
            ]
        );
        assert!(batches.last().is_some_and(|b| b.is_complete));
    }

    struct MockBackend {
        reply: &'static str,
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _options: &CompletionOptions,
        ) -> Result<String, LlmError> {
            Ok(self.reply.to_string())
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_llm_trend_source_clamps_scores() {
        let backend = Arc::new(MockBackend {
            reply: r#"{"trends":[{"title":"Ambient clinical AI","description":"d","impact_score":14,"confidence":1.4,"timeframe":"now"}]}"#,
        });
        let source = LlmTrendSource::new(backend, CompletionOptions::default());
        let trends = source
            .generate(TrendCategory::Technology, 5, None)
            .await
            .unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].impact_score, 10.0);
        assert_eq!(trends[0].confidence, 1.0);
        assert_eq!(trends[0].category, TrendCategory::Technology);
    }

    #[tokio::test]
    async fn test_llm_trend_source_rejects_prose() {
        let backend = Arc::new(MockBackend { reply: "No trends today." });
        let source = LlmTrendSource::new(backend, CompletionOptions::default());
        assert!(source.generate(TrendCategory::Market, 5, None).await.is_err());
    }
}
