//! Outcome history behind an agent's confidence baseline

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use augur_core::{clamp_unit, Outcome, OutcomeResult};

/// Maximum outcomes kept per recommendation id
pub const MAX_OUTCOMES_PER_RECOMMENDATION: usize = 100;

/// Per-recommendation outcome history.
///
/// The baseline acts as one prior observation, so a single outcome moves the
/// confidence halfway and a long history dominates it.
#[derive(Debug)]
pub struct OutcomeLedger {
    baseline: f64,
    history: Mutex<HashMap<String, VecDeque<OutcomeResult>>>,
}

impl OutcomeLedger {
    pub fn new(baseline: f64) -> Self {
        Self {
            baseline: clamp_unit(baseline),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, outcome: &Outcome) {
        let mut history = self.history.lock();
        let entries = history.entry(outcome.recommendation_id.clone()).or_default();
        entries.push_back(outcome.actual_result);
        while entries.len() > MAX_OUTCOMES_PER_RECOMMENDATION {
            entries.pop_front();
        }
    }

    /// Baseline blended with every resolved outcome
    pub fn confidence(&self) -> f64 {
        let history = self.history.lock();
        let scores: Vec<f64> = history
            .values()
            .flat_map(|entries| entries.iter().filter_map(OutcomeResult::score))
            .collect();

        let total = self.baseline + scores.iter().sum::<f64>();
        clamp_unit(total / (1 + scores.len()) as f64)
    }

    pub fn outcomes_for(&self, recommendation_id: &str) -> usize {
        self.history
            .lock()
            .get(recommendation_id)
            .map_or(0, VecDeque::len)
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }
}
