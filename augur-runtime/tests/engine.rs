use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use augur_agents::{AgentError, AgentMetadata, IntelAgent};
use augur_core::{
    Analysis, CompanyProfile, Context, IntelligenceType, MarketChange, Outcome, OutcomeResult,
    SourceConfig, SourceType, Trend, TrendBatch, TrendCategory,
};
use augur_runtime::{EngineConfig, EngineError, IntelligenceEngine, OrchestratorError, TrendSource};
use augur_sources::HttpConfig;

const HN_BODY: &str = r#"{"hits":[
    {"title":"Epic accelerating AI adoption in healthcare"},
    {"title":"Microsoft launches growing healthcare AI platform"}
]}"#;

fn config(sources: Vec<SourceConfig>) -> EngineConfig {
    EngineConfig {
        sources,
        http: HttpConfig {
            max_retries: 0,
            timeout_secs: 5,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn hn_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(HN_BODY))
        .mount(&server)
        .await;
    server
}

struct StubAgent {
    name: &'static str,
    reply: Option<(&'static str, f64)>,
    learned: AtomicUsize,
}

impl StubAgent {
    fn new(name: &'static str, reply: Option<(&'static str, f64)>) -> Self {
        Self {
            name,
            reply,
            learned: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IntelAgent for StubAgent {
    fn agent_type(&self) -> &str {
        self.name
    }

    async fn analyze(&self, _context: &Context) -> Result<Analysis, AgentError> {
        match self.reply {
            Some((conclusion, confidence)) => Ok(Analysis::new(conclusion, confidence)),
            None => Err(AgentError::Unavailable("stub failure".into())),
        }
    }

    fn learn(&self, _outcome: &Outcome) {
        self.learned.fetch_add(1, Ordering::SeqCst);
    }

    fn confidence(&self) -> f64 {
        0.5
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            agent_type: self.name.to_string(),
            version: "test".to_string(),
            capabilities: vec![],
        }
    }
}

#[tokio::test]
async fn test_refresh_then_analyze_from_cached_signals() {
    let server = hn_server().await;
    let source = SourceConfig::new("hn", &format!("{}/hn", server.uri()), SourceType::Technical)
        .with_reliability(0.8);
    let engine = IntelligenceEngine::new(config(vec![source]), None).unwrap();

    let records = engine.refresh(None).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(engine.cache().len(), 2);
    assert!(records.iter().all(|r| r.confidence <= 0.8));

    let context = Context::new("healthcare").with_threshold(0.3);
    let first = engine
        .analyze("AI adoption in healthcare", context.clone())
        .await
        .unwrap();
    assert_eq!(first.agent_analyses.len(), 1);
    assert_eq!(first.agent_analyses[0].data_sources_used, vec!["hn"]);
    assert!(first.primary_conclusion.contains("2 signals"));
    assert_eq!(engine.cache().len(), 3);

    let hits_before = engine.cache().stats().hits;
    let second = engine
        .analyze("AI adoption in healthcare", context)
        .await
        .unwrap();
    assert_eq!(second.primary_conclusion, first.primary_conclusion);
    assert_eq!(second.timestamp, first.timestamp);
    assert_eq!(engine.cache().stats().hits, hits_before + 1);

    // The Epic record and the analysis that mentions it go stale
    let removed = engine.react_to(&MarketChange::new("Epic acquired", vec!["Epic".into()]));
    assert_eq!(removed, 2);
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn test_cached_signals_below_threshold_are_left_out() {
    let server = hn_server().await;
    let source = SourceConfig::new("hn", &format!("{}/hn", server.uri()), SourceType::Technical)
        .with_reliability(0.8);
    let engine = IntelligenceEngine::new(config(vec![source]), None).unwrap();
    assert_eq!(engine.refresh(None).await.unwrap().len(), 2);

    // Nothing cached reaches certainty, so the signal agent has no input
    let strict = engine
        .analyze("AI adoption in healthcare", Context::new("healthcare").with_threshold(1.0))
        .await;
    assert!(matches!(
        strict,
        Err(EngineError::Orchestrator(OrchestratorError::SynthesisFailed { attempted: 0 }))
    ));

    let lenient = engine
        .analyze("AI adoption in healthcare", Context::new("healthcare").with_threshold(0.0))
        .await
        .unwrap();
    assert!(lenient.primary_conclusion.contains("2 signals"));
}

#[tokio::test]
async fn test_analyze_with_nothing_to_go_on_fails() {
    let engine = IntelligenceEngine::new(config(vec![]), None).unwrap();
    let result = engine.analyze("AI adoption", Context::new("healthcare")).await;

    assert!(matches!(
        result,
        Err(EngineError::Orchestrator(OrchestratorError::SynthesisFailed { attempted: 0 }))
    ));
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn test_registered_agents_survive_partial_failure_and_learn() {
    let engine = IntelligenceEngine::new(config(vec![]), None).unwrap();
    let optimist = Arc::new(StubAgent::new("optimist", Some(("adoption accelerating", 0.9))));
    let skeptic = Arc::new(StubAgent::new("skeptic", Some(("adoption accelerating slowly", 0.4))));
    let broken = Arc::new(StubAgent::new("broken", None));
    engine.registry().register_shared(optimist.clone());
    engine.registry().register_shared(skeptic.clone());
    engine.registry().register_shared(broken.clone());

    let result = engine
        .analyze("AI adoption in healthcare", Context::new("healthcare"))
        .await
        .unwrap();
    assert_eq!(result.agent_analyses.len(), 2);
    assert!((result.overall_confidence - 0.65).abs() < 1e-9);
    assert_eq!(result.primary_conclusion, "High confidence: adoption accelerating");

    let outcome = Outcome::new("rec-1", OutcomeResult::Success);
    engine.record_outcome(IntelligenceType::Trend, &outcome);
    assert_eq!(optimist.learned.load(Ordering::SeqCst), 1);
    assert_eq!(broken.learned.load(Ordering::SeqCst), 1);
    assert_eq!(engine.scorer().history_len(IntelligenceType::Trend), 1);
}

struct FlakySource;

#[async_trait]
impl TrendSource for FlakySource {
    async fn generate(
        &self,
        category: TrendCategory,
        count: usize,
        _profile: Option<&CompanyProfile>,
    ) -> Result<Vec<Trend>, AgentError> {
        if category == TrendCategory::Regulatory {
            return Err(AgentError::Unavailable("regulatory feed down".into()));
        }
        Ok((0..count)
            .map(|i| Trend {
                id: format!("{}-{}", category, i),
                title: format!("{} trend {}", category, i),
                description: String::new(),
                category,
                impact_score: 6.0,
                confidence: 0.7,
                timeframe: "6-12 months".into(),
                tags: vec![],
            })
            .collect())
    }
}

#[tokio::test]
async fn test_stream_trends_caches_successful_batches() {
    let engine = IntelligenceEngine::new(config(vec![]), None)
        .unwrap()
        .with_trend_source(Arc::new(FlakySource));

    let batches: Vec<TrendBatch> = engine.stream_trends(12, None, None).collect().await;
    assert_eq!(batches.len(), 4);
    assert_eq!(batches.iter().filter(|b| b.succeeded()).count(), 3);

    assert!(engine.cache().contains("trends:technology"));
    assert!(engine.cache().contains("trends:consumer"));
    assert!(!engine.cache().contains("trends:regulatory"));

    let cached: Option<Vec<Trend>> = engine.cache().get("trends:market");
    assert_eq!(cached.map(|t| t.len()), Some(3));
}

#[tokio::test]
async fn test_stream_trends_without_backend_reports_errors() {
    let engine = IntelligenceEngine::new(config(vec![]), None).unwrap();
    let batches: Vec<TrendBatch> = engine.stream_trends(8, None, None).collect().await;

    assert_eq!(batches.len(), 4);
    assert!(batches.iter().all(|b| b.error.is_some()));
    assert!(batches.iter().any(|b| b.is_complete));
    assert!(engine.cache().is_empty());
}
