//! Market Intelligence Agent
//!
//! Runs a fixed four-step pipeline per query:
//! 1. Market context signals
//! 2. Competitive landscape
//! 3. Adoption timeline
//! 4. Synthesis into one conclusion
//!
//! Each step is one JSON request with a hand-written fallback. Every step
//! appends exactly one reasoning step, and the analysis confidence is the mean
//! of those steps.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use augur_core::{Analysis, Context, Outcome, ReasoningChain, ReasoningStep};

use crate::{
    parse_json, AgentError, AgentMetadata, CompletionOptions, IntelAgent, OutcomeLedger,
    SharedBackend,
};

pub const MARKET_AGENT_TYPE: &str = "market-intelligence";

/// Confidence of the analysis returned when every step failed
pub const DEGRADED_CONFIDENCE: f64 = 0.3;

/// Confidence of a step answered by its fallback
const FALLBACK_STEP_CONFIDENCE: f64 = 0.3;

const INITIAL_BASELINE: f64 = 0.7;

/// Cached signals quoted in prompts
const MAX_PROMPT_SIGNALS: usize = 8;

const MARKET_SYSTEM_PROMPT: &str = r#"
You are a senior market intelligence analyst advising businesses on technology adoption.
Be specific, evidence-based and conservative with confidence. Confidence is a number
between 0 and 1 reflecting how well the evidence supports your answer.
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MarketContextReply {
    signals: Vec<String>,
    growth_drivers: Vec<String>,
    assumptions: Vec<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompetitiveReply {
    positioning: String,
    competitors: Vec<String>,
    threats: Vec<String>,
    assumptions: Vec<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimelineReply {
    stage: String,
    timeline: String,
    milestones: Vec<String>,
    assumptions: Vec<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SynthesisReply {
    conclusion: String,
    actions: Vec<String>,
    alternatives: Vec<String>,
    assumptions: Vec<String>,
    confidence: Option<f64>,
}

/// Outcome of one pipeline step before it is appended to the chain
struct StepOutput {
    description: String,
    evidence: Vec<String>,
    confidence: f64,
    assumptions: Vec<String>,
    /// Answered by the fallback rather than the model
    fell_back: bool,
}

impl StepOutput {
    fn fallback(description: String, evidence: Vec<String>, assumptions: Vec<String>) -> Self {
        Self {
            description,
            evidence,
            confidence: FALLBACK_STEP_CONFIDENCE,
            assumptions,
            fell_back: true,
        }
    }
}

/// Market intelligence agent backed by a completion service
pub struct MarketIntelligenceAgent {
    backend: SharedBackend,
    options: CompletionOptions,
    ledger: OutcomeLedger,
}

impl MarketIntelligenceAgent {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            options: CompletionOptions::default().json(),
            ledger: OutcomeLedger::new(INITIAL_BASELINE),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options.json();
        self
    }

    async fn ask<T: serde::de::DeserializeOwned>(&self, prompt: &str) -> Result<T, AgentError> {
        let reply = self
            .backend
            .complete(MARKET_SYSTEM_PROMPT, prompt, &self.options)
            .await?;
        parse_json(&reply)
    }

    async fn market_context(&self, context: &Context) -> StepOutput {
        let prompt = format!(
            "{}\n\nStep 1 - market context. List the market signals that matter for this question.\n\
             Return JSON: {{\"signals\": [..], \"growth_drivers\": [..], \"assumptions\": [..], \"confidence\": 0.0}}",
            describe_context(context)
        );

        match self.ask::<MarketContextReply>(&prompt).await {
            Ok(reply) if !reply.signals.is_empty() => {
                let mut evidence = reply.signals;
                evidence.extend(reply.growth_drivers);
                StepOutput {
                    description: format!("Gathered market context signals for {}", context.domain),
                    evidence,
                    confidence: reply.confidence.unwrap_or(0.5),
                    assumptions: reply.assumptions,
                    fell_back: false,
                }
            }
            outcome => {
                log_fallback("market context", outcome.err());
                let evidence: Vec<String> = context
                    .signals
                    .iter()
                    .take(MAX_PROMPT_SIGNALS)
                    .map(|s| s.title.clone())
                    .collect();
                StepOutput::fallback(
                    format!("Used cached signals as market context for {}", context.domain),
                    evidence,
                    vec!["Cached signals reflect the current market".to_string()],
                )
            }
        }
    }

    async fn competitive_landscape(&self, context: &Context, market: &StepOutput) -> StepOutput {
        let prompt = format!(
            "{}\n\nMarket signals:\n{}\n\nStep 2 - competitive landscape. Who competes here and how?\n\
             Return JSON: {{\"positioning\": \"..\", \"competitors\": [..], \"threats\": [..], \"assumptions\": [..], \"confidence\": 0.0}}",
            describe_context(context),
            bullet_list(&market.evidence)
        );

        match self.ask::<CompetitiveReply>(&prompt).await {
            Ok(reply) if !reply.positioning.trim().is_empty() => {
                let mut assumptions = reply.assumptions;
                assumptions.extend(reply.threats.into_iter().map(|t| format!("Threat: {}", t)));
                StepOutput {
                    description: format!("Assessed competitive landscape: {}", reply.positioning),
                    evidence: reply.competitors,
                    confidence: reply.confidence.unwrap_or(0.5),
                    assumptions,
                    fell_back: false,
                }
            }
            outcome => {
                log_fallback("competitive landscape", outcome.err());
                let competitors: Vec<String> = distinct(
                    context
                        .signals
                        .iter()
                        .flat_map(|s| s.entities.iter().cloned()),
                );
                StepOutput::fallback(
                    "Competitive landscape inferred from entities in cached signals".to_string(),
                    competitors,
                    vec!["Entities named in signals are active competitors".to_string()],
                )
            }
        }
    }

    async fn adoption_timeline(
        &self,
        context: &Context,
        market: &StepOutput,
        competition: &StepOutput,
    ) -> StepOutput {
        let prompt = format!(
            "{}\n\nMarket signals:\n{}\n\nCompetitive landscape: {}\n\n\
             Step 3 - adoption timeline. Forecast adoption over {}.\n\
             Return JSON: {{\"stage\": \"..\", \"timeline\": \"..\", \"milestones\": [..], \"assumptions\": [..], \"confidence\": 0.0}}",
            describe_context(context),
            bullet_list(&market.evidence),
            competition.description,
            context.time_horizon.label()
        );

        match self.ask::<TimelineReply>(&prompt).await {
            Ok(reply) if !reply.timeline.trim().is_empty() => {
                let description = if reply.stage.trim().is_empty() {
                    format!("Forecast adoption timeline: {}", reply.timeline)
                } else {
                    format!("Forecast adoption timeline ({}): {}", reply.stage, reply.timeline)
                };
                StepOutput {
                    description,
                    evidence: reply.milestones,
                    confidence: reply.confidence.unwrap_or(0.5),
                    assumptions: reply.assumptions,
                    fell_back: false,
                }
            }
            outcome => {
                log_fallback("adoption timeline", outcome.err());
                StepOutput::fallback(
                    format!("Adoption timeline not forecast; assumed {}", context.time_horizon.label()),
                    Vec::new(),
                    vec![format!("Adoption follows {}", context.time_horizon.label())],
                )
            }
        }
    }

    async fn synthesis(
        &self,
        context: &Context,
        previous: &[&StepOutput],
    ) -> (StepOutput, Option<SynthesisReply>) {
        let findings: Vec<String> = previous.iter().map(|s| s.description.clone()).collect();
        let prompt = format!(
            "{}\n\nFindings so far:\n{}\n\n\
             Step 4 - synthesis. Give one conclusion sentence and concrete recommended actions.\n\
             Return JSON: {{\"conclusion\": \"..\", \"actions\": [..], \"alternatives\": [..], \"assumptions\": [..], \"confidence\": 0.0}}",
            describe_context(context),
            bullet_list(&findings)
        );

        match self.ask::<SynthesisReply>(&prompt).await {
            Ok(reply) if !reply.conclusion.trim().is_empty() => {
                let description = match reply.actions.first() {
                    Some(action) => format!("Recommend: {}", action),
                    None => format!("Synthesized conclusion for {}", context.domain),
                };
                let step = StepOutput {
                    description,
                    evidence: vec![reply.conclusion.clone()],
                    confidence: reply.confidence.unwrap_or(0.5),
                    assumptions: reply.assumptions.clone(),
                    fell_back: false,
                };
                (step, Some(reply))
            }
            outcome => {
                log_fallback("synthesis", outcome.err());
                let step = StepOutput::fallback(
                    format!("Synthesis unavailable for {}", context.domain),
                    Vec::new(),
                    Vec::new(),
                );
                (step, None)
            }
        }
    }
}

#[async_trait]
impl IntelAgent for MarketIntelligenceAgent {
    fn agent_type(&self) -> &str {
        MARKET_AGENT_TYPE
    }

    async fn analyze(&self, context: &Context) -> Result<Analysis, AgentError> {
        debug!("Market agent analyzing: {}", context.domain);

        let market = self.market_context(context).await;
        let competition = self.competitive_landscape(context, &market).await;
        let timeline = self.adoption_timeline(context, &market, &competition).await;
        let (synthesis, reply) = self.synthesis(context, &[&market, &competition, &timeline]).await;

        let steps = [market, competition, timeline, synthesis];
        let all_failed = steps.iter().all(|s| s.fell_back);

        let mut chain = ReasoningChain::new();
        let mut evidence = Vec::new();
        for step in steps {
            evidence.extend(step.evidence.iter().cloned());
            chain.push(step.description, step.evidence, step.confidence, step.assumptions);
        }
        let evidence = distinct(evidence.into_iter());

        let mut sources: Vec<String> = distinct(
            context
                .signals
                .iter()
                .flat_map(|s| s.sources.iter().cloned()),
        );
        sources.push(format!("model:{}", self.backend.model_name()));

        if all_failed {
            warn!("Market agent degraded: every step fell back for {}", context.domain);
            let conclusion = format!(
                "Insufficient market intelligence to assess {}",
                context.domain
            );
            return Ok(Analysis::new(conclusion, DEGRADED_CONFIDENCE)
                .with_reasoning(chain.into_steps())
                .with_evidence(evidence)
                .with_sources(sources));
        }

        let confidence = chain.mean_confidence().unwrap_or(DEGRADED_CONFIDENCE);
        let (conclusion, alternatives) = match reply {
            Some(reply) => (reply.conclusion, reply.alternatives),
            None => (fallback_conclusion(context, chain.steps()), Vec::new()),
        };

        info!(
            "Market agent concluded with confidence {:.2} over {} steps",
            confidence,
            chain.len()
        );

        Ok(Analysis::new(conclusion, confidence)
            .with_reasoning(chain.into_steps())
            .with_evidence(evidence)
            .with_alternatives(alternatives)
            .with_sources(sources))
    }

    fn learn(&self, outcome: &Outcome) {
        self.ledger.record(outcome);
    }

    fn confidence(&self) -> f64 {
        self.ledger.confidence()
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            agent_type: MARKET_AGENT_TYPE.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec![
                "market_context".to_string(),
                "competitive_landscape".to_string(),
                "adoption_timeline".to_string(),
                "synthesis".to_string(),
            ],
        }
    }

    async fn health_check(&self) -> bool {
        self.backend.is_configured()
    }
}

fn log_fallback(step: &str, error: Option<AgentError>) {
    match error {
        Some(e) => debug!("Market agent step '{}' fell back: {}", step, e),
        None => debug!("Market agent step '{}' fell back: empty answer", step),
    }
}

/// Conclusion built from the strongest model-answered step
fn fallback_conclusion(context: &Context, steps: &[ReasoningStep]) -> String {
    steps
        .iter()
        .filter(|s| s.confidence > FALLBACK_STEP_CONFIDENCE)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|s| format!("{}: {}", context.domain, s.description))
        .unwrap_or_else(|| format!("Limited evidence on {}", context.domain))
}

fn describe_context(context: &Context) -> String {
    let mut lines = vec![format!("Question: {}", context.domain)];
    if let Some(company) = &context.company {
        lines.push(format!("Company: {}", company.describe()));
    }
    if let Some(role) = &context.user_role {
        lines.push(format!("Asked by: {}", role));
    }
    lines.push(format!("Horizon: {}", context.time_horizon.label()));

    if !context.signals.is_empty() {
        lines.push("Recent intelligence:".to_string());
        for signal in context.signals.iter().take(MAX_PROMPT_SIGNALS) {
            lines.push(format!(
                "- [{}] {} (confidence {:.2})",
                signal.intelligence_type, signal.title, signal.confidence
            ));
        }
    }
    lines.join("\n")
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn distinct(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.filter(|item| seen.insert(item.to_lowercase())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LlmBackend, LlmError};
    use augur_core::OutcomeResult;
    use std::sync::Arc;

    /// Answers each step from its prompt; steps listed in `broken` get prose
    struct MockBackend {
        broken: Vec<&'static str>,
        configured: bool,
    }

    impl MockBackend {
        fn working() -> Self {
            Self { broken: vec![], configured: true }
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _options: &CompletionOptions,
        ) -> Result<String, LlmError> {
            let step = ["Step 1", "Step 2", "Step 3", "Step 4"]
                .into_iter()
                .find(|s| user.contains(s))
                .unwrap_or("unknown");
            if self.broken.contains(&step) {
                return Ok("Sorry, I can't produce JSON right now.".to_string());
            }
            let reply = match step {
                "Step 1" => r#"{"signals":["Hospitals piloting AI scribes"],"growth_drivers":["Staff shortages"],"confidence":0.8}"#,
                "Step 2" => r#"{"positioning":"Incumbent EHR vendors lead","competitors":["Epic","Microsoft"],"threats":["Vendor lock-in"],"confidence":0.7}"#,
                "Step 3" => r#"{"stage":"early majority","timeline":"broad adoption within 18 months","milestones":["FDA guidance"],"confidence":0.6}"#,
                "Step 4" => r#"{"conclusion":"AI adoption in healthcare is accelerating","actions":["Prioritize documentation automation pilots"],"alternatives":["Adoption may stall on regulation"],"confidence":0.9}"#,
                _ => "{}",
            };
            Ok(reply.to_string())
        }

        fn model_name(&self) -> &str {
            "mock"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl LlmBackend for FailingBackend {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _options: &CompletionOptions,
        ) -> Result<String, LlmError> {
            Err(LlmError::RateLimited)
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn context() -> Context {
        Context::new("AI adoption in healthcare")
    }

    #[tokio::test]
    async fn test_four_steps_and_mean_confidence() {
        let agent = MarketIntelligenceAgent::new(Arc::new(MockBackend::working()));
        let analysis = agent.analyze(&context()).await.unwrap();

        assert_eq!(analysis.reasoning.len(), 4);
        let ordinals: Vec<u32> = analysis.reasoning.iter().map(|s| s.step).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4]);
        assert!((analysis.confidence - 0.75).abs() < 1e-9);
        assert_eq!(analysis.conclusion, "AI adoption in healthcare is accelerating");
        assert_eq!(analysis.alternatives, vec!["Adoption may stall on regulation"]);
        assert!(analysis.reasoning[3].description.starts_with("Recommend"));
        assert!(analysis
            .reasoning[1]
            .assumptions
            .contains(&"Threat: Vendor lock-in".to_string()));
    }

    #[tokio::test]
    async fn test_chain_resets_between_calls() {
        let agent = MarketIntelligenceAgent::new(Arc::new(MockBackend::working()));
        agent.analyze(&context()).await.unwrap();
        let second = agent.analyze(&context()).await.unwrap();
        assert_eq!(second.reasoning.len(), 4);
    }

    #[tokio::test]
    async fn test_one_broken_step_uses_fallback() {
        let backend = MockBackend { broken: vec!["Step 3"], configured: true };
        let agent = MarketIntelligenceAgent::new(Arc::new(backend));
        let analysis = agent.analyze(&context()).await.unwrap();

        assert_eq!(analysis.reasoning.len(), 4);
        assert!((analysis.reasoning[2].confidence - FALLBACK_STEP_CONFIDENCE).abs() < 1e-9);
        // (0.8 + 0.7 + 0.3 + 0.9) / 4
        assert!((analysis.confidence - 0.675).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_steps_failing_degrades() {
        let agent = MarketIntelligenceAgent::new(Arc::new(FailingBackend));
        let analysis = agent.analyze(&context()).await.unwrap();

        assert!((analysis.confidence - DEGRADED_CONFIDENCE).abs() < 1e-9);
        assert_eq!(analysis.reasoning.len(), 4);
        assert!(analysis.conclusion.contains("Insufficient"));
    }

    #[tokio::test]
    async fn test_health_follows_backend_configuration() {
        let healthy = MarketIntelligenceAgent::new(Arc::new(MockBackend::working()));
        let unconfigured = MarketIntelligenceAgent::new(Arc::new(MockBackend {
            broken: vec![],
            configured: false,
        }));
        assert!(healthy.health_check().await);
        assert!(!unconfigured.health_check().await);
    }

    #[test]
    fn test_learning_adjusts_confidence() {
        let agent = MarketIntelligenceAgent::new(Arc::new(MockBackend::working()));
        assert!((agent.confidence() - INITIAL_BASELINE).abs() < 1e-9);
        agent.learn(&Outcome::new("rec-1", OutcomeResult::Failure));
        assert!(agent.confidence() < INITIAL_BASELINE);
    }
}
