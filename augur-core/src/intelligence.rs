//! Intelligence records flowing from sources to agents
//!
//! A [`RawIntelligence`] is one opaque payload fragment fetched from a source.
//! The processor turns it into a [`ProcessedIntelligence`], which is typed,
//! scored and carries an expiry. Scores are clamped where they are set.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::{clamp_unit, DEFAULT_EXPIRY_HOURS, NEUTRAL_CONFIDENCE};

/// Kinds of external sources, each with its own response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Social,
    News,
    Technical,
    Financial,
    Reviews,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Social => "social",
            SourceType::News => "news",
            SourceType::Technical => "technical",
            SourceType::Financial => "financial",
            SourceType::Reviews => "reviews",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payload fragment as fetched from a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIntelligence {
    /// Identifier of the originating source
    pub source_id: String,
    /// Shape of the originating source
    pub source_type: SourceType,
    /// Opaque payload fragment
    pub raw_payload: serde_json::Value,
    /// Fetch timestamp
    pub timestamp: DateTime<Utc>,
    /// Where the payload was fetched from
    pub source_url: Option<String>,
    /// Declared reliability of the source (0.0 - 1.0)
    pub reliability: f64,
}

impl RawIntelligence {
    pub fn new(source_id: &str, source_type: SourceType, raw_payload: serde_json::Value) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_type,
            raw_payload,
            timestamp: Utc::now(),
            source_url: None,
            reliability: NEUTRAL_CONFIDENCE,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.source_url = Some(url.to_string());
        self
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = clamp_unit(reliability);
        self
    }

    /// Flatten the payload into plain text for keyword matching and prompts
    pub fn text(&self) -> String {
        payload_text(&self.raw_payload)
    }
}

/// Collect the human-readable text in a JSON payload.
///
/// Well-known text fields are preferred; if none are present every string
/// value is joined.
pub fn payload_text(payload: &serde_json::Value) -> String {
    const TEXT_FIELDS: &[&str] = &[
        "title", "headline", "name", "summary", "description", "text", "body", "content",
        "selftext", "review", "comment",
    ];

    match payload {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => {
            let preferred: Vec<&str> = TEXT_FIELDS
                .iter()
                .filter_map(|field| map.get(*field).and_then(|v| v.as_str()))
                .filter(|s| !s.trim().is_empty())
                .collect();

            if preferred.is_empty() {
                let mut parts = Vec::new();
                collect_strings(payload, &mut parts);
                parts.join(" ")
            } else {
                preferred.join(". ")
            }
        }
        other => {
            let mut parts = Vec::new();
            collect_strings(other, &mut parts);
            parts.join(" ")
        }
    }
}

fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Classification of a processed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntelligenceType {
    Trend,
    Competitor,
    MarketSentiment,
    Regulatory,
    Technical,
}

impl IntelligenceType {
    pub const ALL: [IntelligenceType; 5] = [
        IntelligenceType::Trend,
        IntelligenceType::Competitor,
        IntelligenceType::MarketSentiment,
        IntelligenceType::Regulatory,
        IntelligenceType::Technical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntelligenceType::Trend => "trend",
            IntelligenceType::Competitor => "competitor",
            IntelligenceType::MarketSentiment => "market_sentiment",
            IntelligenceType::Regulatory => "regulatory",
            IntelligenceType::Technical => "technical",
        }
    }

    /// Lenient parse of AI output ("Market Sentiment", "market-sentiment", ...)
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace([' ', '-'], "_");
        IntelligenceType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for IntelligenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" | "mixed" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// A normalized, typed intelligence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedIntelligence {
    pub id: String,
    #[serde(rename = "type")]
    pub intelligence_type: IntelligenceType,
    pub title: String,
    pub summary: String,
    pub sentiment: Sentiment,
    /// Trust in this record (0.0 - 1.0)
    pub confidence: f64,
    /// Ids of the sources this record was derived from
    pub sources: BTreeSet<String>,
    pub entities: Vec<String>,
    pub tags: Vec<String>,
    /// Expected business impact (1.0 - 10.0)
    pub impact_score: f64,
    pub processed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ProcessedIntelligence {
    pub fn builder(intelligence_type: IntelligenceType, title: &str) -> ProcessedIntelligenceBuilder {
        ProcessedIntelligenceBuilder::new(intelligence_type, title)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Age in fractional hours at `now`
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.processed_at).num_milliseconds().max(0) as f64 / 3_600_000.0
    }
}

/// Clamp an impact score into `[1, 10]`
pub fn clamp_impact(value: f64) -> f64 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(1.0, 10.0)
    }
}

/// Builder for processed intelligence records
pub struct ProcessedIntelligenceBuilder {
    intelligence_type: IntelligenceType,
    title: String,
    summary: String,
    sentiment: Sentiment,
    confidence: f64,
    sources: BTreeSet<String>,
    entities: Vec<String>,
    tags: Vec<String>,
    impact_score: f64,
    processed_at: Option<DateTime<Utc>>,
    lifetime: Duration,
}

impl ProcessedIntelligenceBuilder {
    pub fn new(intelligence_type: IntelligenceType, title: &str) -> Self {
        Self {
            intelligence_type,
            title: title.to_string(),
            summary: String::new(),
            sentiment: Sentiment::default(),
            confidence: NEUTRAL_CONFIDENCE,
            sources: BTreeSet::new(),
            entities: Vec::new(),
            tags: Vec::new(),
            impact_score: 1.0,
            processed_at: None,
            lifetime: Duration::hours(DEFAULT_EXPIRY_HOURS),
        }
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    pub fn sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn source(mut self, source_id: &str) -> Self {
        self.sources.insert(source_id.to_string());
        self
    }

    pub fn entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn impact(mut self, impact: f64) -> Self {
        self.impact_score = clamp_impact(impact);
        self
    }

    pub fn processed_at(mut self, at: DateTime<Utc>) -> Self {
        self.processed_at = Some(at);
        self
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn build(self) -> ProcessedIntelligence {
        let processed_at = self.processed_at.unwrap_or_else(Utc::now);
        ProcessedIntelligence {
            id: Uuid::new_v4().to_string(),
            intelligence_type: self.intelligence_type,
            title: self.title,
            summary: self.summary,
            sentiment: self.sentiment,
            confidence: self.confidence,
            sources: self.sources,
            entities: self.entities,
            tags: self.tags,
            impact_score: self.impact_score,
            processed_at,
            expires_at: processed_at + self.lifetime,
        }
    }
}

/// A change in the market that stales cached intelligence about its entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketChange {
    pub description: String,
    pub affected_entities: Vec<String>,
    /// How disruptive the change is (0.0 - 1.0)
    pub severity: f64,
    pub detected_at: DateTime<Utc>,
}

impl MarketChange {
    pub fn new(description: &str, affected_entities: Vec<String>) -> Self {
        Self {
            description: description.to_string(),
            affected_entities,
            severity: NEUTRAL_CONFIDENCE,
            detected_at: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: f64) -> Self {
        self.severity = clamp_unit(severity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_clamps_scores() {
        let record = ProcessedIntelligence::builder(IntelligenceType::Trend, "Edge AI")
            .confidence(1.4)
            .impact(42.0)
            .source("hn")
            .build();

        assert_eq!(record.confidence, 1.0);
        assert_eq!(record.impact_score, 10.0);
        assert!(record.sources.contains("hn"));
    }

    #[test]
    fn test_default_expiry_is_24_hours() {
        let now = Utc::now();
        let record = ProcessedIntelligence::builder(IntelligenceType::Technical, "Rust")
            .processed_at(now)
            .build();

        assert_eq!(record.expires_at - record.processed_at, Duration::hours(24));
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + Duration::hours(25)));
    }

    #[test]
    fn test_type_parse_is_lenient() {
        assert_eq!(
            IntelligenceType::parse("Market Sentiment"),
            Some(IntelligenceType::MarketSentiment)
        );
        assert_eq!(IntelligenceType::parse("regulatory"), Some(IntelligenceType::Regulatory));
        assert_eq!(IntelligenceType::parse("weather"), None);
    }

    #[test]
    fn test_payload_text_prefers_known_fields() {
        let payload = json!({"title": "Chip shortage eases", "url": "https://x", "score": 10});
        assert_eq!(payload_text(&payload), "Chip shortage eases");

        let nested = json!({"data": {"quote": "AAPL up", "extra": ["strong demand"]}});
        let text = payload_text(&nested);
        assert!(text.contains("AAPL up"));
        assert!(text.contains("strong demand"));
    }

    #[test]
    fn test_raw_reliability_clamped() {
        let raw = RawIntelligence::new("s", SourceType::News, json!("x")).with_reliability(3.0);
        assert_eq!(raw.reliability, 1.0);
    }

    #[test]
    fn test_processed_serializes_type_field() {
        let record = ProcessedIntelligence::builder(IntelligenceType::Competitor, "X").build();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "competitor");
    }
}
