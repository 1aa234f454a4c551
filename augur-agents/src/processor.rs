//! Intelligence Processor
//!
//! Turns one raw payload into one typed record. The AI enrichment call is
//! tried first; when it fails or its output cannot be parsed the keyword
//! heuristics take over. Processing a record never fails.

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use augur_core::{
    assess, clamp_unit, heuristic_title, truncate_words, HeuristicAssessment, IntelligenceType,
    ProcessedIntelligence, RawIntelligence, Sentiment,
};

use crate::{parse_json, AgentError, CompletionOptions, SharedBackend};

const PROCESSOR_SYSTEM_PROMPT: &str = r#"
You are a market intelligence analyst. Classify the raw signal you are given.

Return JSON with these fields:
- "type": one of "trend", "competitor", "market_sentiment", "regulatory", "technical"
- "title": a headline of at most 12 words
- "summary": two sentences on why this matters to a business
- "sentiment": "positive", "neutral" or "negative"
- "entities": companies, products and organizations mentioned
- "tags": short lowercase topic tags
- "impact_score": business impact from 1 to 10
- "confidence": how sure you are of this classification, from 0 to 1
"#;

/// Payload text sent to the model is cut to this many characters
const MAX_PROMPT_CHARS: usize = 3000;

const SUMMARY_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
struct Enrichment {
    #[serde(rename = "type", default)]
    intelligence_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    entities: Option<Vec<String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default, alias = "impact")]
    impact_score: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

pub struct IntelligenceProcessor {
    backend: Option<SharedBackend>,
    options: CompletionOptions,
}

impl IntelligenceProcessor {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend: Some(backend),
            options: CompletionOptions::default().json(),
        }
    }

    /// Processor that never calls a model
    pub fn heuristic_only() -> Self {
        Self {
            backend: None,
            options: CompletionOptions::default().json(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options.json();
        self
    }

    /// Process one raw record
    pub async fn process(&self, raw: &RawIntelligence) -> ProcessedIntelligence {
        let text = raw.text();
        let heuristics = assess(&text, raw.reliability);

        let enrichment = match &self.backend {
            Some(backend) => match self.enrich(backend, raw, &text).await {
                Ok(enrichment) => Some(enrichment),
                Err(e) => {
                    debug!("Falling back to heuristics for {}: {}", raw.source_id, e);
                    None
                }
            },
            None => None,
        };

        build_record(raw, &text, heuristics, enrichment)
    }

    /// Process many records concurrently; output order is not preserved
    pub async fn process_all(
        &self,
        raws: &[RawIntelligence],
        max_concurrent: usize,
    ) -> Vec<ProcessedIntelligence> {
        use futures::stream::{self, StreamExt};

        stream::iter(raws)
            .map(|raw| self.process(raw))
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await
    }

    async fn enrich(
        &self,
        backend: &SharedBackend,
        raw: &RawIntelligence,
        text: &str,
    ) -> Result<Enrichment, AgentError> {
        let prompt = format!(
            "Source: {} ({})\n\nSignal:\n{}",
            raw.source_id,
            raw.source_type,
            truncate_words(text, MAX_PROMPT_CHARS)
        );

        let reply = backend
            .complete(PROCESSOR_SYSTEM_PROMPT, &prompt, &self.options)
            .await?;
        parse_json(&reply)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Merge the model's answer over the heuristic one, field by field
fn build_record(
    raw: &RawIntelligence,
    text: &str,
    heuristics: HeuristicAssessment,
    enrichment: Option<Enrichment>,
) -> ProcessedIntelligence {
    let mut intelligence_type = heuristics.intelligence_type;
    let mut title = heuristic_title(text);
    let mut summary = truncate_words(text, SUMMARY_CHARS);
    let mut sentiment = heuristics.sentiment;
    let mut entities = heuristics.entities;
    let mut tags = heuristics.tags;
    let mut impact = heuristics.impact_score;
    let mut model_confidence = None;

    if let Some(e) = enrichment {
        if let Some(t) = e.intelligence_type.as_deref().and_then(IntelligenceType::parse) {
            intelligence_type = t;
        }
        if let Some(s) = e.sentiment.as_deref().and_then(Sentiment::parse) {
            sentiment = s;
        }
        title = non_blank(e.title).unwrap_or(title);
        summary = non_blank(e.summary).unwrap_or(summary);
        entities = e.entities.unwrap_or(entities);
        tags = e
            .tags
            .map(|tags| tags.into_iter().map(|t| t.to_lowercase()).collect())
            .unwrap_or(tags);
        impact = e.impact_score.filter(|v| v.is_finite()).unwrap_or(impact);
        model_confidence = e.confidence.filter(|v| v.is_finite());
    }

    // Never more confident than the source is reliable
    let confidence = clamp_unit(raw.reliability)
        .min(clamp_unit(model_confidence.unwrap_or(heuristics.confidence)));

    ProcessedIntelligence::builder(intelligence_type, &title)
        .summary(&summary)
        .sentiment(sentiment)
        .confidence(confidence)
        .source(&raw.source_id)
        .entities(entities)
        .tags(tags)
        .impact(impact)
        .processed_at(Utc::now())
        .build()
}
