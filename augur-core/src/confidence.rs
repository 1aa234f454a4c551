//! Weighted confidence scoring
//!
//! Confidence is a weighted sum of five factors, each clamped to `[0, 1]`:
//!
//! | factor              | weight |
//! |---------------------|--------|
//! | source reliability  | 0.30   |
//! | evidence strength   | 0.25   |
//! | consensus           | 0.20   |
//! | recency             | 0.15   |
//! | historical accuracy | 0.10   |
//!
//! Historical accuracy is the mean of a rolling, capped outcome history kept
//! per intelligence type.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::{clamp_unit, IntelligenceType, Outcome, ProcessedIntelligence, SourceConfig, NEUTRAL_CONFIDENCE};

/// Maximum outcomes remembered per intelligence type
pub const MAX_ACCURACY_HISTORY: usize = 100;

pub const WEIGHT_SOURCE_RELIABILITY: f64 = 0.3;
pub const WEIGHT_EVIDENCE_STRENGTH: f64 = 0.25;
pub const WEIGHT_CONSENSUS: f64 = 0.2;
pub const WEIGHT_RECENCY: f64 = 0.15;
pub const WEIGHT_HISTORICAL_ACCURACY: f64 = 0.1;

/// The inputs of one confidence computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub source_reliability: f64,
    pub evidence_strength: f64,
    pub consensus: f64,
    pub recency: f64,
    pub historical_accuracy: f64,
}

impl ConfidenceFactors {
    /// Every factor clamped to `[0, 1]`
    pub fn clamped(self) -> Self {
        Self {
            source_reliability: clamp_unit(self.source_reliability),
            evidence_strength: clamp_unit(self.evidence_strength),
            consensus: clamp_unit(self.consensus),
            recency: clamp_unit(self.recency),
            historical_accuracy: clamp_unit(self.historical_accuracy),
        }
    }

    /// Weighted sum of the clamped factors
    pub fn score(&self) -> f64 {
        let f = self.clamped();
        clamp_unit(
            f.source_reliability * WEIGHT_SOURCE_RELIABILITY
                + f.evidence_strength * WEIGHT_EVIDENCE_STRENGTH
                + f.consensus * WEIGHT_CONSENSUS
                + f.recency * WEIGHT_RECENCY
                + f.historical_accuracy * WEIGHT_HISTORICAL_ACCURACY,
        )
    }
}

/// Step-down freshness boost by record age
pub fn recency_boost(age_hours: f64) -> f64 {
    if age_hours.is_nan() || age_hours < 1.0 {
        1.0
    } else if age_hours < 6.0 {
        0.9
    } else if age_hours < 24.0 {
        0.8
    } else if age_hours < 72.0 {
        0.6
    } else {
        0.4
    }
}

/// Scores records and learns per-type accuracy from outcomes
#[derive(Debug, Default)]
pub struct ConfidenceScorer {
    source_reliability: RwLock<HashMap<String, f64>>,
    history: RwLock<HashMap<IntelligenceType, VecDeque<f64>>>,
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scorer that knows the reliability of the given sources
    pub fn with_sources(sources: &[SourceConfig]) -> Self {
        let scorer = Self::new();
        for source in sources {
            scorer.register_source(&source.id, source.reliability);
        }
        scorer
    }

    pub fn register_source(&self, source_id: &str, reliability: f64) {
        self.source_reliability
            .write()
            .insert(source_id.to_string(), clamp_unit(reliability));
    }

    /// Confidence of a record as of now
    pub fn calculate_confidence(&self, record: &ProcessedIntelligence) -> f64 {
        self.calculate_confidence_at(record, Utc::now())
    }

    pub fn calculate_confidence_at(&self, record: &ProcessedIntelligence, now: DateTime<Utc>) -> f64 {
        self.factors_at(record, now).score()
    }

    /// Derive the clamped factors for a record as of `now`
    pub fn factors_at(&self, record: &ProcessedIntelligence, now: DateTime<Utc>) -> ConfidenceFactors {
        let source_reliability = {
            let known = self.source_reliability.read();
            if record.sources.is_empty() {
                NEUTRAL_CONFIDENCE
            } else {
                let total: f64 = record
                    .sources
                    .iter()
                    .map(|id| known.get(id).copied().unwrap_or(NEUTRAL_CONFIDENCE))
                    .sum();
                total / record.sources.len() as f64
            }
        };

        let evidence_strength = (record.entities.len() + record.tags.len()) as f64 / 10.0;
        let consensus = record.sources.len() as f64 / 3.0;
        let recency = recency_boost(record.age_hours(now));
        let historical_accuracy = self.historical_accuracy(record.intelligence_type);

        ConfidenceFactors {
            source_reliability,
            evidence_strength,
            consensus,
            recency,
            historical_accuracy,
        }
        .clamped()
    }

    /// Record an observed outcome for a type. Unresolved outcomes are ignored.
    pub fn update_accuracy(&self, intelligence_type: IntelligenceType, outcome: &Outcome) {
        let Some(score) = outcome.actual_result.score() else {
            debug!(
                "Ignoring unresolved outcome for recommendation {}",
                outcome.recommendation_id
            );
            return;
        };

        let mut history = self.history.write();
        let entries = history.entry(intelligence_type).or_default();
        entries.push_back(score);
        while entries.len() > MAX_ACCURACY_HISTORY {
            entries.pop_front();
        }
    }

    /// Mean of the outcome history for a type, neutral when empty
    pub fn historical_accuracy(&self, intelligence_type: IntelligenceType) -> f64 {
        let history = self.history.read();
        match history.get(&intelligence_type) {
            Some(entries) if !entries.is_empty() => {
                clamp_unit(entries.iter().sum::<f64>() / entries.len() as f64)
            }
            _ => NEUTRAL_CONFIDENCE,
        }
    }

    pub fn history_len(&self, intelligence_type: IntelligenceType) -> usize {
        self.history
            .read()
            .get(&intelligence_type)
            .map_or(0, VecDeque::len)
    }
}
