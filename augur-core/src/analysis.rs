//! Types exchanged between the orchestrator and agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{clamp_unit, ProcessedIntelligence, NEUTRAL_CONFIDENCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySize {
    Startup,
    Small,
    Medium,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechMaturity {
    Emerging,
    Developing,
    Mature,
    Leading,
}

/// The company an analysis is performed for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub industry: String,
    pub size: CompanySize,
    pub tech_maturity: TechMaturity,
}

impl CompanyProfile {
    pub fn new(industry: &str, size: CompanySize, tech_maturity: TechMaturity) -> Self {
        Self {
            industry: industry.to_string(),
            size,
            tech_maturity,
        }
    }

    /// One-line description for prompts
    pub fn describe(&self) -> String {
        format!(
            "{:?} {} company with {:?} technology maturity",
            self.size, self.industry, self.tech_maturity
        )
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    /// Up to 6 months
    ShortTerm,
    /// 6 to 18 months
    #[default]
    MediumTerm,
    /// Beyond 18 months
    LongTerm,
}

impl TimeHorizon {
    pub fn label(&self) -> &'static str {
        match self {
            TimeHorizon::ShortTerm => "the next 6 months",
            TimeHorizon::MediumTerm => "the next 6-18 months",
            TimeHorizon::LongTerm => "beyond 18 months",
        }
    }
}

/// Input for one analysis call. Immutable per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub company: Option<CompanyProfile>,
    pub user_role: Option<String>,
    /// Free-text domain or query
    pub domain: String,
    pub time_horizon: TimeHorizon,
    /// Minimum confidence the caller cares about (0.0 - 1.0)
    pub confidence_threshold: f64,
    /// Processed intelligence available to agents
    #[serde(default)]
    pub signals: Vec<ProcessedIntelligence>,
}

impl Context {
    pub fn new(domain: &str) -> Self {
        Self {
            company: None,
            user_role: None,
            domain: domain.to_string(),
            time_horizon: TimeHorizon::default(),
            confidence_threshold: NEUTRAL_CONFIDENCE,
            signals: Vec::new(),
        }
    }

    pub fn with_company(mut self, company: CompanyProfile) -> Self {
        self.company = Some(company);
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.user_role = Some(role.to_string());
        self
    }

    pub fn with_horizon(mut self, horizon: TimeHorizon) -> Self {
        self.time_horizon = horizon;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = clamp_unit(threshold);
        self
    }

    pub fn with_signals(mut self, signals: Vec<ProcessedIntelligence>) -> Self {
        self.signals = signals;
        self
    }
}

/// One stage of an agent's reasoning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based ordinal within the chain
    pub step: u32,
    pub description: String,
    pub evidence: Vec<String>,
    pub confidence: f64,
    pub assumptions: Vec<String>,
}

/// Append-only reasoning chain built during one `analyze` call
#[derive(Debug, Clone, Default)]
pub struct ReasoningChain {
    steps: Vec<ReasoningStep>,
}

impl ReasoningChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        description: impl Into<String>,
        evidence: Vec<String>,
        confidence: f64,
        assumptions: Vec<String>,
    ) -> &ReasoningStep {
        let step = ReasoningStep {
            step: self.steps.len() as u32 + 1,
            description: description.into(),
            evidence,
            confidence: clamp_unit(confidence),
            assumptions,
        };
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    /// Arithmetic mean of step confidences, `None` for an empty chain
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.steps.is_empty() {
            None
        } else {
            let total: f64 = self.steps.iter().map(|s| s.confidence).sum();
            Some(total / self.steps.len() as f64)
        }
    }

    pub fn into_steps(self) -> Vec<ReasoningStep> {
        self.steps
    }
}

/// One agent's complete output for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub conclusion: String,
    pub confidence: f64,
    pub reasoning: Vec<ReasoningStep>,
    pub evidence: Vec<String>,
    pub alternatives: Vec<String>,
    pub data_sources_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Analysis {
    pub fn new(conclusion: impl Into<String>, confidence: f64) -> Self {
        Self {
            conclusion: conclusion.into(),
            confidence: clamp_unit(confidence),
            reasoning: Vec::new(),
            evidence: Vec::new(),
            alternatives: Vec::new(),
            data_sources_used: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: Vec<ReasoningStep>) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.data_sources_used = sources;
        self
    }
}

/// The orchestrator's single output per query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedIntelligence {
    pub primary_conclusion: String,
    pub overall_confidence: f64,
    pub agent_analyses: Vec<Analysis>,
    pub cross_agent_insights: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub risk_factors: Vec<String>,
    pub alternative_perspectives: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeResult {
    Success,
    Failure,
    Partial,
    InProgress,
}

impl OutcomeResult {
    /// Accuracy contribution of a resolved outcome; unresolved ones have none
    pub fn score(&self) -> Option<f64> {
        match self {
            OutcomeResult::Success => Some(1.0),
            OutcomeResult::Partial => Some(0.5),
            OutcomeResult::Failure => Some(0.0),
            OutcomeResult::InProgress => None,
        }
    }
}

impl fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeResult::Success => "success",
            OutcomeResult::Failure => "failure",
            OutcomeResult::Partial => "partial",
            OutcomeResult::InProgress => "in_progress",
        };
        f.write_str(s)
    }
}

/// Observed result of acting on a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub recommendation_id: String,
    pub actual_result: OutcomeResult,
    pub user_feedback: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Outcome {
    pub fn new(recommendation_id: &str, actual_result: OutcomeResult) -> Self {
        Self {
            recommendation_id: recommendation_id.to_string(),
            actual_result,
            user_feedback: None,
            notes: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_feedback(mut self, feedback: &str) -> Self {
        self.user_feedback = Some(feedback.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}
