//! Deterministic keyword heuristics
//!
//! Used by the processor whenever AI enrichment fails or returns output that
//! cannot be parsed. Supports:
//! - Type inference from keyword families
//! - Sentiment from positive/negative word lists
//! - Entity and tag matching against a fixed vocabulary
//! - Impact scoring from keyword hits scaled by source reliability

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::{clamp_impact, clamp_unit, IntelligenceType, Sentiment};

static WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9][a-z0-9+#.\-]*[a-z0-9+#]|[a-z0-9]").unwrap());

const TYPE_KEYWORDS: &[(IntelligenceType, &[&str])] = &[
    (
        IntelligenceType::Regulatory,
        &[
            "regulation", "regulatory", "compliance", "law", "legislation", "gdpr", "hipaa",
            "policy", "fine", "ban", "sec", "ftc", "mandate", "court", "lawsuit",
        ],
    ),
    (
        IntelligenceType::Competitor,
        &[
            "competitor", "acquisition", "acquires", "acquired", "merger", "launches", "rival",
            "market share", "funding", "raises", "partnership", "startup",
        ],
    ),
    (
        IntelligenceType::Technical,
        &[
            "api", "framework", "release", "open source", "github", "library", "sdk",
            "architecture", "benchmark", "model", "protocol", "vulnerability", "kubernetes",
        ],
    ),
    (
        IntelligenceType::MarketSentiment,
        &[
            "investors", "stock", "shares", "earnings", "revenue", "sentiment", "outlook",
            "analysts", "forecast", "valuation", "bullish", "bearish", "demand",
        ],
    ),
    (
        IntelligenceType::Trend,
        &[
            "trend", "adoption", "growing", "emerging", "rise", "shift", "surge", "momentum",
            "mainstream", "accelerating", "wave", "boom",
        ],
    ),
];

const POSITIVE_WORDS: &[&str] = &[
    "growth", "growing", "gain", "gains", "surge", "success", "successful", "strong", "record",
    "profit", "beat", "breakthrough", "improve", "improved", "innovative", "opportunity",
    "accelerating", "bullish", "win", "expands", "love", "excellent", "great",
];

const NEGATIVE_WORDS: &[&str] = &[
    "decline", "declining", "loss", "losses", "drop", "fall", "risk", "fail", "failure",
    "weak", "layoffs", "lawsuit", "breach", "fine", "ban", "bearish", "slowdown", "concern",
    "crisis", "shortage", "hate", "terrible", "poor", "downturn",
];

/// Entities recognized without AI assistance
const ENTITY_VOCABULARY: &[&str] = &[
    "OpenAI", "Anthropic", "Google", "Microsoft", "Amazon", "AWS", "Apple", "Meta", "Nvidia",
    "Salesforce", "Oracle", "IBM", "Tesla", "Stripe", "Shopify", "SAP", "Intel", "AMD",
    "Snowflake", "Databricks", "GitHub", "Epic", "Cerner", "FDA", "SEC", "FTC", "EU",
];

/// Tags recognized without AI assistance, matched case-insensitively
const TAG_VOCABULARY: &[&str] = &[
    "ai", "machine learning", "llm", "generative ai", "automation", "cloud", "saas",
    "cybersecurity", "blockchain", "fintech", "healthcare", "e-commerce", "sustainability",
    "iot", "edge computing", "data privacy", "robotics", "quantum", "5g", "analytics",
    "supply chain", "remote work", "ev", "semiconductors",
];

/// Result of running all heuristics over one text
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicAssessment {
    pub intelligence_type: IntelligenceType,
    pub sentiment: Sentiment,
    pub entities: Vec<String>,
    pub tags: Vec<String>,
    /// Keyword family and vocabulary matches
    pub keyword_hits: usize,
    pub impact_score: f64,
    pub confidence: f64,
}

/// Lowercased word tokens of a text
fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_REGEX
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Match a keyword as a whole token, or as a phrase when it has spaces
fn matches_keyword(lowered: &str, tokens: &HashSet<&str>, keyword: &str) -> bool {
    if keyword.contains(' ') {
        lowered.contains(keyword)
    } else {
        tokens.contains(keyword)
    }
}

/// Infer the record type and the number of keyword hits supporting it.
///
/// Ties resolve in declaration order; no hits at all means a general trend.
pub fn infer_type(text: &str) -> (IntelligenceType, usize) {
    let lowered = text.to_lowercase();
    let owned = tokenize(text);
    let tokens: HashSet<&str> = owned.iter().map(String::as_str).collect();

    let mut best = (IntelligenceType::Trend, 0usize);
    for (intelligence_type, keywords) in TYPE_KEYWORDS {
        let hits = keywords
            .iter()
            .filter(|k| matches_keyword(&lowered, &tokens, k))
            .count();
        if hits > best.1 {
            best = (*intelligence_type, hits);
        }
    }
    best
}

/// Count positive against negative words
pub fn infer_sentiment(text: &str) -> Sentiment {
    let tokens = tokenize(text);
    let positive = tokens
        .iter()
        .filter(|t| POSITIVE_WORDS.contains(&t.as_str()))
        .count();
    let negative = tokens
        .iter()
        .filter(|t| NEGATIVE_WORDS.contains(&t.as_str()))
        .count();

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// Vocabulary entities mentioned in the text, in vocabulary order
pub fn extract_entities(text: &str) -> Vec<String> {
    let owned = tokenize(text);
    let tokens: HashSet<&str> = owned.iter().map(String::as_str).collect();

    ENTITY_VOCABULARY
        .iter()
        .filter(|entity| tokens.contains(entity.to_lowercase().as_str()))
        .map(|entity| entity.to_string())
        .collect()
}

/// Vocabulary tags mentioned in the text, in vocabulary order
pub fn extract_tags(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let owned = tokenize(text);
    let tokens: HashSet<&str> = owned.iter().map(String::as_str).collect();

    TAG_VOCABULARY
        .iter()
        .filter(|tag| matches_keyword(&lowered, &tokens, tag))
        .map(|tag| tag.to_string())
        .collect()
}

/// Impact grows with keyword hits, scaled by how reliable the source is
pub fn heuristic_impact(keyword_hits: usize, reliability: f64) -> f64 {
    clamp_impact(1.0 + keyword_hits as f64 * clamp_unit(reliability) * 1.5)
}

/// Confidence from keyword hits: 0.4 base, +0.1 per hit up to 0.8
pub fn heuristic_confidence(keyword_hits: usize) -> f64 {
    0.4 + 0.1 * keyword_hits.min(4) as f64
}

/// Run every heuristic over a text
pub fn assess(text: &str, reliability: f64) -> HeuristicAssessment {
    let (intelligence_type, type_hits) = infer_type(text);
    let entities = extract_entities(text);
    let tags = extract_tags(text);
    let keyword_hits = type_hits + tags.len();

    HeuristicAssessment {
        intelligence_type,
        sentiment: infer_sentiment(text),
        entities,
        tags,
        keyword_hits,
        impact_score: heuristic_impact(keyword_hits, reliability),
        confidence: heuristic_confidence(keyword_hits),
    }
}

/// Headline-sized title: first sentence, at most 120 characters on a word boundary
pub fn heuristic_title(text: &str) -> String {
    let first = text
        .split(['.', '\n', '!', '?'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("Untitled signal");

    truncate_words(first, 120)
}

/// Truncate to at most `max_chars` characters without splitting a word
pub fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => format!("{}...", cut[..pos].trim_end()),
        _ => format!("{}...", cut),
    }
}
