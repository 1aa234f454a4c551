//! Multi-Agent Orchestrator
//!
//! Fans one query out to every agent it is given:
//! - Every call, including its wait for a concurrency slot, must finish
//!   within half the query's response budget, counted from fan-out
//! - A failed, timed-out or cancelled agent drops out alone
//! - Survivors are synthesized into one ranked conclusion
//!
//! Only the case where no agent finishes is an error.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use augur_agents::{AgentError, SharedAgent};
use augur_core::{clamp_unit, Analysis, Context, SynthesizedIntelligence};

/// Lists in a synthesis are cut to this many items
pub const MAX_SYNTHESIS_ITEMS: usize = 5;

/// Conclusion words shorter than this are not themes
const MIN_THEME_WORD_LEN: usize = 5;

const HIGH_CONFIDENCE: f64 = 0.8;
const MODERATE_CONFIDENCE: f64 = 0.6;
const LOW_CONFIDENCE: f64 = 0.5;

/// Words that mark a reasoning step as a recommended action
const IMPERATIVE_CUES: &[&str] = &[
    "recommend", "should", "consider", "prioritize", "invest", "adopt", "implement", "build",
    "partner", "evaluate", "pilot", "focus", "start", "avoid",
];

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Intelligence synthesis failed: no agent could complete analysis ({attempted} attempted)")]
    SynthesisFailed { attempted: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Response budget per query; each agent gets half of it
    pub max_response_time_ms: u64,
    /// Analyses running at once
    pub max_concurrent_agents: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_response_time_ms: 30_000,
            max_concurrent_agents: 8,
        }
    }
}

impl OrchestratorConfig {
    pub fn max_response_time(&self) -> Duration {
        Duration::from_millis(self.max_response_time_ms)
    }
}

/// One query to coordinate
#[derive(Debug, Clone)]
pub struct AnalysisQuery {
    pub query: String,
    pub context: Context,
    pub max_response_time: Duration,
}

impl AnalysisQuery {
    pub fn new(query: &str, context: Context, max_response_time: Duration) -> Self {
        Self {
            query: query.to_string(),
            context,
            max_response_time,
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Query built from this orchestrator's response budget
    pub fn query(&self, query: &str, context: Context) -> AnalysisQuery {
        AnalysisQuery::new(query, context, self.config.max_response_time())
    }

    pub async fn coordinate(
        &self,
        agents: &[SharedAgent],
        query: &AnalysisQuery,
    ) -> Result<SynthesizedIntelligence, OrchestratorError> {
        self.coordinate_with_cancel(agents, query, &CancellationToken::new())
            .await
    }

    /// Coordinate, abandoning every outstanding agent call once `cancel` fires
    pub async fn coordinate_with_cancel(
        &self,
        agents: &[SharedAgent],
        query: &AnalysisQuery,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedIntelligence, OrchestratorError> {
        let started = Instant::now();
        let per_agent = query.max_response_time / 2;
        let deadline = started + per_agent;
        let semaphore = Semaphore::new(self.config.max_concurrent_agents.max(1));

        info!(
            "Coordinating {} agents for \"{}\" ({:?} per agent)",
            agents.len(),
            query.query,
            per_agent
        );

        let calls = agents.iter().map(|agent| {
            run_agent(agent, &query.context, deadline, per_agent, &semaphore, cancel)
        });
        let results = join_all(calls).await;

        let analyses: Vec<Analysis> = results.into_iter().flatten().collect();
        if analyses.is_empty() {
            error!("No agent could complete analysis for \"{}\"", query.query);
            return Err(OrchestratorError::SynthesisFailed {
                attempted: agents.len(),
            });
        }

        debug!(
            "{} of {} agents finished in {:?}",
            analyses.len(),
            agents.len(),
            started.elapsed()
        );
        Ok(synthesize(analyses))
    }
}

async fn run_agent(
    agent: &SharedAgent,
    context: &Context,
    deadline: Instant,
    limit: Duration,
    semaphore: &Semaphore,
    cancel: &CancellationToken,
) -> Option<Analysis> {
    let work = async {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| AgentError::Cancelled)?;
        agent.analyze(context).await
    };
    let work = async {
        match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(limit.as_millis() as u64)),
        }
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        result = work => result,
    };

    match result {
        Ok(mut analysis) => {
            analysis.confidence = clamp_unit(analysis.confidence);
            Some(analysis)
        }
        Err(e) => {
            warn!("Agent {} dropped from synthesis: {}", agent.agent_type(), e);
            None
        }
    }
}

/// Qualitative label for a confidence value
pub fn confidence_label(confidence: f64) -> &'static str {
    if confidence >= HIGH_CONFIDENCE {
        "High confidence"
    } else if confidence >= MODERATE_CONFIDENCE {
        "Moderate confidence"
    } else {
        "Low confidence"
    }
}

/// Combine surviving analyses. `analyses` must not be empty.
pub fn synthesize(mut analyses: Vec<Analysis>) -> SynthesizedIntelligence {
    // Highest confidence first; equal confidence keeps agent order
    analyses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let overall_confidence = if analyses.is_empty() {
        0.0
    } else {
        clamp_unit(analyses.iter().map(|a| a.confidence).sum::<f64>() / analyses.len() as f64)
    };

    let primary_conclusion = analyses
        .first()
        .map(|top| format!("{}: {}", confidence_label(top.confidence), top.conclusion))
        .unwrap_or_default();

    let cross_agent_insights = cross_agent_insights(&analyses);
    let recommended_actions = recommended_actions(&analyses);
    let risk_factors = risk_factors(&analyses);
    let alternative_perspectives = dedup_capped(
        analyses
            .iter()
            .flat_map(|a| a.alternatives.iter().cloned()),
    );

    SynthesizedIntelligence {
        primary_conclusion,
        overall_confidence,
        agent_analyses: analyses,
        cross_agent_insights,
        recommended_actions,
        risk_factors,
        alternative_perspectives,
        timestamp: chrono::Utc::now(),
    }
}

fn cross_agent_insights(analyses: &[Analysis]) -> Vec<String> {
    let mut insights = Vec::new();

    let themes = convergent_themes(analyses);
    if !themes.is_empty() {
        insights.push(format!("Convergent themes across agents: {}", themes.join(", ")));
    }

    let has_high = analyses.iter().any(|a| a.confidence >= HIGH_CONFIDENCE);
    let has_low = analyses.iter().any(|a| a.confidence < LOW_CONFIDENCE);
    if has_high && has_low {
        let min = analyses.iter().map(|a| a.confidence).fold(f64::INFINITY, f64::min);
        let max = analyses.iter().map(|a| a.confidence).fold(0.0, f64::max);
        insights.push(format!(
            "Mixed confidence across agents ({:.2} to {:.2}); treat the conclusion as uncertain",
            min, max
        ));
    }

    for (evidence, count) in corroborating_evidence(analyses) {
        insights.push(format!("Corroborated {} times: {}", count, evidence));
    }

    insights
}

fn theme_words(conclusion: &str) -> HashSet<String> {
    conclusion
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_THEME_WORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Conclusion words shared by at least two agents, most shared first
fn convergent_themes(analyses: &[Analysis]) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for analysis in analyses {
        for word in theme_words(&analysis.conclusion) {
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut themes: Vec<(String, usize)> = counts.into_iter().filter(|(_, n)| *n >= 2).collect();
    themes.sort_by(|a, b| b.1.cmp(&a.1));
    themes
        .into_iter()
        .take(MAX_SYNTHESIS_ITEMS)
        .map(|(word, _)| word)
        .collect()
}

/// Evidence strings appearing at least twice across all analyses
fn corroborating_evidence(analyses: &[Analysis]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    let mut order = Vec::new();
    for evidence in analyses.iter().flat_map(|a| a.evidence.iter()) {
        let key = evidence.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let slot = counts.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (evidence.trim().to_string(), 0)
        });
        slot.1 += 1;
    }

    order
        .into_iter()
        .filter_map(|key| counts.remove(&key))
        .filter(|(_, n)| *n >= 2)
        .take(MAX_SYNTHESIS_ITEMS)
        .collect()
}

fn is_imperative(description: &str) -> bool {
    let lowered = description.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| IMPERATIVE_CUES.contains(&word))
}

fn recommended_actions(analyses: &[Analysis]) -> Vec<String> {
    dedup_capped(
        analyses
            .iter()
            .flat_map(|a| a.reasoning.iter())
            .filter(|step| is_imperative(&step.description))
            .map(|step| step.description.clone()),
    )
}

fn risk_factors(analyses: &[Analysis]) -> Vec<String> {
    dedup_capped(analyses.iter().flat_map(|a| a.reasoning.iter()).flat_map(|step| {
        let weak = (step.confidence < LOW_CONFIDENCE).then(|| step.description.clone());
        weak.into_iter().chain(step.assumptions.iter().cloned())
    }))
}

/// Case-insensitive dedup keeping first occurrences, capped
fn dedup_capped(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|item| !item.trim().is_empty())
        .filter(|item| seen.insert(item.trim().to_lowercase()))
        .take(MAX_SYNTHESIS_ITEMS)
        .collect()
}
