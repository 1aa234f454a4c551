//! Intelligence Engine
//!
//! Wires the layers into one data flow:
//! - `refresh` ingests sources, processes each payload and caches the records
//! - `analyze` answers from cache or fans the query out to eligible agents
//! - `stream_trends` streams category batches and caches the successful ones
//!
//! The engine owns its cache and registry; nothing is process-global.

use futures::future::join_all;
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use augur_agents::{
    AgentRegistry, IntelligenceProcessor, MarketIntelligenceAgent, SharedBackend, SignalTrendAgent,
};
use augur_core::{
    hash_data, ttl_for_confidence, CacheError, CacheOptions, CompanyProfile, ConfidenceScorer,
    Context, IntelCache, IntelligenceType, MarketChange, Outcome, ProcessedIntelligence,
    SynthesizedIntelligence, TrendBatch, INTELLIGENCE_TAG,
};
use augur_sources::{FetchError, SourceFetcher, SourceStatus};

use crate::{
    BatchGenerator, EngineConfig, LlmTrendSource, Orchestrator, OrchestratorError,
    ProgressCallback, SharedTrendSource, UnavailableTrendSource,
};

/// Cached records handed to agents per analysis
pub const MAX_CONTEXT_SIGNALS: usize = 20;

pub const ANALYSIS_TAG: &str = "analysis";
pub const TRENDS_TAG: &str = "trends";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

pub struct IntelligenceEngine {
    config: EngineConfig,
    fetcher: SourceFetcher,
    processor: IntelligenceProcessor,
    registry: AgentRegistry,
    orchestrator: Orchestrator,
    scorer: ConfidenceScorer,
    cache: Arc<IntelCache>,
    batches: BatchGenerator,
}

impl IntelligenceEngine {
    /// Build an engine. Without a backend the processor runs on heuristics
    /// alone, only the signal agent is registered and trend generation
    /// reports every batch as failed.
    pub fn new(config: EngineConfig, backend: Option<SharedBackend>) -> Result<Self, EngineError> {
        let fetcher = SourceFetcher::new(config.sources.clone(), config.http.clone())?;
        let options = config.llm.completion_options();
        let registry = AgentRegistry::new();
        registry.register(SignalTrendAgent::new());

        let (processor, trends): (IntelligenceProcessor, SharedTrendSource) = match backend {
            Some(backend) => {
                registry.register(
                    MarketIntelligenceAgent::new(Arc::clone(&backend)).with_options(options.clone()),
                );
                (
                    IntelligenceProcessor::new(Arc::clone(&backend)).with_options(options.clone()),
                    Arc::new(LlmTrendSource::new(backend, options)),
                )
            }
            None => {
                info!("No completion backend configured, running on heuristics");
                (
                    IntelligenceProcessor::heuristic_only(),
                    Arc::new(UnavailableTrendSource),
                )
            }
        };

        Ok(Self {
            scorer: ConfidenceScorer::with_sources(&config.sources),
            cache: Arc::new(IntelCache::new(config.cache.clone())),
            orchestrator: Orchestrator::new(config.orchestrator.clone()),
            batches: BatchGenerator::new(trends),
            fetcher,
            processor,
            registry,
            config,
        })
    }

    /// Replace the trend source used by `stream_trends`
    pub fn with_trend_source(mut self, source: SharedTrendSource) -> Self {
        self.batches = BatchGenerator::new(source);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &IntelCache {
        &self.cache
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn fetcher(&self) -> &SourceFetcher {
        &self.fetcher
    }

    /// Ingest, process and cache. Returns the records written.
    pub async fn refresh(
        &self,
        source_ids: Option<&[String]>,
    ) -> Result<Vec<ProcessedIntelligence>, EngineError> {
        let raws = self.fetcher.ingest(source_ids).await;
        let records = self
            .processor
            .process_all(&raws, self.config.http.max_concurrent)
            .await;

        for record in &records {
            self.cache
                .cache_with_confidence(&format!("intel:{}", record.id), record)?;
        }

        info!(
            "Refresh cached {} records from {} payloads ({} entries total)",
            records.len(),
            raws.len(),
            self.cache.len()
        );
        Ok(records)
    }

    pub async fn analyze(
        &self,
        query: &str,
        context: Context,
    ) -> Result<SynthesizedIntelligence, EngineError> {
        self.analyze_with_cancel(query, context, &CancellationToken::new())
            .await
    }

    /// Answer a query from cache, or coordinate the eligible agents
    pub async fn analyze_with_cancel(
        &self,
        query: &str,
        context: Context,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedIntelligence, EngineError> {
        let key = analysis_key(query, &context)?;
        if let Some(cached) = self.cache.get::<SynthesizedIntelligence>(&key) {
            debug!("Analysis cache hit for \"{}\"", query);
            return Ok(cached);
        }

        let domain = context.domain.clone();
        let context = self.with_cached_signals(context);
        let agents: Vec<_> = self
            .registry
            .healthy()
            .await
            .into_iter()
            .filter(|agent| agent.can_handle(&context))
            .collect();

        let request = self.orchestrator.query(query, context);
        let result = self
            .orchestrator
            .coordinate_with_cancel(&agents, &request, cancel)
            .await?;

        let options = CacheOptions::new()
            .ttl(ttl_for_confidence(
                self.config.cache.default_ttl(),
                result.overall_confidence,
            ))
            .tags(vec![ANALYSIS_TAG.to_string(), domain])
            .confidence(result.overall_confidence);
        self.cache.set(&key, &result, options)?;

        Ok(result)
    }

    /// Fill an empty context with the most trusted cached records scoring at
    /// least the context's confidence threshold
    fn with_cached_signals(&self, context: Context) -> Context {
        if !context.signals.is_empty() {
            return context;
        }

        let mut scored: Vec<(f64, ProcessedIntelligence)> = self
            .cache
            .values_with_tag::<ProcessedIntelligence>(INTELLIGENCE_TAG)
            .into_iter()
            .map(|record| (self.scorer.calculate_confidence(&record), record))
            .filter(|(score, _)| *score >= context.confidence_threshold)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(MAX_CONTEXT_SIGNALS);

        debug!("Adding {} cached records to the analysis context", scored.len());
        context.with_signals(scored.into_iter().map(|(_, record)| record).collect())
    }

    /// Stream trend batches; each successful batch is cached under
    /// `trends:<category>` as it arrives
    pub fn stream_trends(
        &self,
        count: usize,
        profile: Option<CompanyProfile>,
        on_progress: Option<ProgressCallback>,
    ) -> impl Stream<Item = TrendBatch> + Send + 'static {
        let cache = Arc::clone(&self.cache);
        let default_ttl = self.config.cache.default_ttl();

        self.batches
            .generate_batches(count, profile, on_progress)
            .inspect(move |batch| {
                if let Err(e) = cache_batch(&cache, default_ttl, batch) {
                    warn!("Failed to cache batch {}: {}", batch.batch_id, e);
                }
            })
    }

    /// Drop cached entries touched by a market change
    pub fn react_to(&self, change: &MarketChange) -> usize {
        self.cache.invalidate_market_change(change)
    }

    /// Feed an observed outcome to the scorer and every registered agent
    pub fn record_outcome(&self, intelligence_type: IntelligenceType, outcome: &Outcome) {
        self.scorer.update_accuracy(intelligence_type, outcome);
        for agent in self.registry.all() {
            agent.learn(outcome);
        }
    }

    /// Check every configured source concurrently
    pub async fn source_status(&self) -> Vec<SourceStatus> {
        let checks = self.fetcher.sources().iter().map(|s| self.fetcher.check_source(&s.id));
        join_all(checks)
            .await
            .into_iter()
            .filter_map(|status| status.ok())
            .collect()
    }
}

fn analysis_key(query: &str, context: &Context) -> Result<String, CacheError> {
    let serialized = serde_json::to_string(&(query, context))?;
    Ok(format!("analysis:{}", hash_data(&serialized)))
}

fn cache_batch(
    cache: &IntelCache,
    default_ttl: std::time::Duration,
    batch: &TrendBatch,
) -> Result<(), CacheError> {
    let Some(category) = batch.category.filter(|_| batch.succeeded()) else {
        return Ok(());
    };
    if batch.trends.is_empty() {
        return Ok(());
    }

    let confidence =
        batch.trends.iter().map(|t| t.confidence).sum::<f64>() / batch.trends.len() as f64;
    let options = CacheOptions::new()
        .ttl(ttl_for_confidence(default_ttl, confidence))
        .tags(vec![TRENDS_TAG.to_string(), category.to_string()])
        .confidence(confidence);
    cache.set(&format!("trends:{}", category), &batch.trends, options)
}
