//! Streaming trend generation units
//!
//! Batches and progress reports are transient: they are produced while a
//! generation request runs and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clamp_unit;

/// Fixed partition used for bulk trend generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendCategory {
    Technology,
    Market,
    Consumer,
    Regulatory,
}

impl TrendCategory {
    pub const ALL: [TrendCategory; 4] = [
        TrendCategory::Technology,
        TrendCategory::Market,
        TrendCategory::Consumer,
        TrendCategory::Regulatory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendCategory::Technology => "technology",
            TrendCategory::Market => "market",
            TrendCategory::Consumer => "consumer",
            TrendCategory::Regulatory => "regulatory",
        }
    }
}

impl fmt::Display for TrendCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated market trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TrendCategory,
    /// Expected business impact (1.0 - 10.0)
    pub impact_score: f64,
    pub confidence: f64,
    /// Free-text adoption timeframe ("12-18 months")
    pub timeframe: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One category-scoped unit of streamed output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBatch {
    pub batch_id: String,
    pub trends: Vec<Trend>,
    pub category: Option<TrendCategory>,
    /// Fraction of batches complete when this one was emitted
    pub progress: f64,
    pub is_complete: bool,
    pub error: Option<String>,
}

impl TrendBatch {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Progress report emitted after each batch completes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total_batches: usize,
    pub completed_batches: usize,
    pub progress: f64,
    pub estimated_time_remaining_ms: u64,
}

impl BatchProgress {
    /// Build a report, extrapolating remaining time from elapsed time over progress
    pub fn new(total_batches: usize, completed_batches: usize, elapsed_ms: u64) -> Self {
        let progress = if total_batches == 0 {
            1.0
        } else {
            clamp_unit(completed_batches as f64 / total_batches as f64)
        };

        let estimated_time_remaining_ms = if progress <= 0.0 {
            0
        } else {
            let projected_total = elapsed_ms as f64 / progress;
            (projected_total - elapsed_ms as f64).max(0.0).round() as u64
        };

        Self {
            total_batches,
            completed_batches,
            progress,
            estimated_time_remaining_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_extrapolation() {
        // 1 of 4 done after 1s: projected 4s total, 3s left
        let p = BatchProgress::new(4, 1, 1000);
        assert_eq!(p.progress, 0.25);
        assert_eq!(p.estimated_time_remaining_ms, 3000);

        let done = BatchProgress::new(4, 4, 5000);
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.estimated_time_remaining_ms, 0);
    }

    #[test]
    fn test_progress_without_batches() {
        let p = BatchProgress::new(0, 0, 10);
        assert_eq!(p.progress, 1.0);
        assert_eq!(p.estimated_time_remaining_ms, 0);
    }
}
