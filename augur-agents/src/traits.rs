//! Common contract for analysis agents

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use augur_core::{Analysis, Context, Outcome};

use crate::LlmError;

/// Errors from agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,
}

/// Static description of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub agent_type: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

/// Common interface for all analysis agents.
///
/// Only `analyze` does real work; everything else is cheap and synchronous
/// except the health check, which may ping a backend.
#[async_trait]
pub trait IntelAgent: Send + Sync {
    /// Stable registry key
    fn agent_type(&self) -> &str;

    /// Analyze one context into one conclusion
    async fn analyze(&self, context: &Context) -> Result<Analysis, AgentError>;

    /// Fold an observed outcome into the agent's confidence baseline
    fn learn(&self, outcome: &Outcome);

    /// Current confidence baseline (0.0 - 1.0)
    fn confidence(&self) -> f64;

    fn can_handle(&self, _context: &Context) -> bool {
        true
    }

    fn metadata(&self) -> AgentMetadata;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Thread-safe reference to an agent
pub type SharedAgent = Arc<dyn IntelAgent>;
