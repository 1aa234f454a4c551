//! Signal Trend Agent
//!
//! Deterministic agent over the processed intelligence carried in a context.
//! No model calls: it reports the dominant intelligence type, the sentiment
//! balance and the most mentioned entities.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

use augur_core::{
    Analysis, Context, IntelligenceType, Outcome, ProcessedIntelligence, ReasoningChain, Sentiment,
};

use crate::{AgentError, AgentMetadata, IntelAgent, OutcomeLedger};

pub const SIGNAL_AGENT_TYPE: &str = "signal-trends";

const INITIAL_BASELINE: f64 = 0.6;

const TOP_ENTITIES: usize = 3;

pub struct SignalTrendAgent {
    ledger: OutcomeLedger,
}

impl Default for SignalTrendAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalTrendAgent {
    pub fn new() -> Self {
        Self {
            ledger: OutcomeLedger::new(INITIAL_BASELINE),
        }
    }
}

/// Types ranked by record count, ties broken by type order
fn rank_types(signals: &[ProcessedIntelligence]) -> Vec<(IntelligenceType, usize)> {
    let mut counts: BTreeMap<IntelligenceType, usize> = BTreeMap::new();
    for signal in signals {
        *counts.entry(signal.intelligence_type).or_default() += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

fn top_entities(signals: &[ProcessedIntelligence]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entity in signals.iter().flat_map(|s| s.entities.iter()) {
        *counts.entry(entity.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(entity, count)| (entity.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_ENTITIES);
    ranked
}

#[async_trait]
impl IntelAgent for SignalTrendAgent {
    fn agent_type(&self) -> &str {
        SIGNAL_AGENT_TYPE
    }

    async fn analyze(&self, context: &Context) -> Result<Analysis, AgentError> {
        let signals = &context.signals;
        if signals.is_empty() {
            return Err(AgentError::Unavailable("no intelligence records in context".into()));
        }
        let total = signals.len() as f64;
        let mut chain = ReasoningChain::new();

        // Dominant type
        let ranked = rank_types(signals);
        let (dominant, dominant_count) = ranked[0];
        let type_evidence: Vec<String> = signals
            .iter()
            .filter(|s| s.intelligence_type == dominant)
            .map(|s| s.title.clone())
            .collect();
        chain.push(
            format!(
                "{} of {} signals are {} intelligence",
                dominant_count,
                signals.len(),
                dominant
            ),
            type_evidence.clone(),
            dominant_count as f64 / total,
            vec!["Record types were classified correctly".to_string()],
        );

        // Sentiment balance
        let positive = signals.iter().filter(|s| s.sentiment == Sentiment::Positive).count();
        let negative = signals.iter().filter(|s| s.sentiment == Sentiment::Negative).count();
        let (tone, balance_confidence) = if positive == negative {
            ("mixed", 0.4)
        } else {
            let tone = if positive > negative { "positive" } else { "negative" };
            (tone, 0.5 + 0.5 * (positive as f64 - negative as f64).abs() / total)
        };
        chain.push(
            format!("Sentiment is {} ({} positive, {} negative)", tone, positive, negative),
            Vec::new(),
            balance_confidence,
            Vec::new(),
        );

        // Entities and record quality
        let entities = top_entities(signals);
        let mean_confidence = signals.iter().map(|s| s.confidence).sum::<f64>() / total;
        let entity_names: Vec<String> = entities.iter().map(|(e, _)| e.clone()).collect();
        let entity_description = if entity_names.is_empty() {
            "No recurring entities across signals".to_string()
        } else {
            format!("Most mentioned: {}", entity_names.join(", "))
        };
        chain.push(
            entity_description,
            entities
                .iter()
                .map(|(e, n)| format!("{} mentioned in {} signals", e, n))
                .collect(),
            mean_confidence,
            vec!["Cached signals reflect the current market".to_string()],
        );

        let about = if entity_names.is_empty() {
            context.domain.clone()
        } else {
            entity_names.join(", ")
        };
        let conclusion = format!(
            "{} signals show {} {} activity around {}",
            signals.len(),
            tone,
            dominant.as_str().replace('_', " "),
            about
        );

        let alternatives: Vec<String> = ranked
            .iter()
            .skip(1)
            .map(|(t, n)| format!("Secondary theme: {} ({} signals)", t.as_str().replace('_', " "), n))
            .collect();

        let mut sources: Vec<String> = signals
            .iter()
            .flat_map(|s| s.sources.iter().cloned())
            .collect();
        sources.sort();
        sources.dedup();

        let confidence = chain.mean_confidence().unwrap_or(0.0);
        Ok(Analysis::new(conclusion, confidence)
            .with_reasoning(chain.into_steps())
            .with_evidence(type_evidence)
            .with_alternatives(alternatives)
            .with_sources(sources))
    }

    fn learn(&self, outcome: &Outcome) {
        self.ledger.record(outcome);
    }

    fn confidence(&self) -> f64 {
        self.ledger.confidence()
    }

    fn can_handle(&self, context: &Context) -> bool {
        !context.signals.is_empty()
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            agent_type: SIGNAL_AGENT_TYPE.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec!["signal_aggregation".to_string(), "sentiment_balance".to_string()],
        }
    }
}
