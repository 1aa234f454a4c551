//! Agent registry
//!
//! Maps agent type to instance. `healthy()` runs every health check at once
//! and leaves out agents that fail, so a broken agent never fails a query.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{AgentMetadata, IntelAgent, SharedAgent};

#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, SharedAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any agent of the same type
    pub fn register<A: IntelAgent + 'static>(&self, agent: A) -> Option<SharedAgent> {
        self.register_shared(Arc::new(agent))
    }

    pub fn register_shared(&self, agent: SharedAgent) -> Option<SharedAgent> {
        let agent_type = agent.agent_type().to_string();
        debug!("Registering agent {}", agent_type);
        self.agents.insert(agent_type, agent)
    }

    pub fn unregister(&self, agent_type: &str) -> Option<SharedAgent> {
        self.agents.remove(agent_type).map(|(_, agent)| agent)
    }

    pub fn get(&self, agent_type: &str) -> Option<SharedAgent> {
        self.agents.get(agent_type).map(|entry| Arc::clone(entry.value()))
    }

    /// Every registered agent, sorted by type
    pub fn all(&self) -> Vec<SharedAgent> {
        let mut agents: Vec<SharedAgent> = self
            .agents
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        agents.sort_by(|a, b| a.agent_type().cmp(b.agent_type()));
        agents
    }

    pub fn metadata(&self) -> Vec<AgentMetadata> {
        self.all().iter().map(|agent| agent.metadata()).collect()
    }

    /// Agents whose health check passes, sorted by type
    pub async fn healthy(&self) -> Vec<SharedAgent> {
        let agents = self.all();
        let checks = join_all(agents.iter().map(|agent| agent.health_check())).await;

        agents
            .into_iter()
            .zip(checks)
            .filter_map(|(agent, healthy)| {
                if healthy {
                    Some(agent)
                } else {
                    warn!("Agent {} failed its health check", agent.agent_type());
                    None
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentError;
    use async_trait::async_trait;
    use augur_core::{Analysis, Context, Outcome};

    struct StubAgent {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl IntelAgent for StubAgent {
        fn agent_type(&self) -> &str {
            self.name
        }

        async fn analyze(&self, _context: &Context) -> Result<Analysis, AgentError> {
            Ok(Analysis::new("stub", 0.5))
        }

        fn learn(&self, _outcome: &Outcome) {}

        fn confidence(&self) -> f64 {
            0.5
        }

        fn metadata(&self) -> AgentMetadata {
            AgentMetadata {
                agent_type: self.name.to_string(),
                version: "0.0.1".to_string(),
                capabilities: vec![],
            }
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }
    }

    #[tokio::test]
    async fn test_healthy_excludes_failing_agents() {
        let registry = AgentRegistry::new();
        registry.register(StubAgent { name: "alpha", healthy: true });
        registry.register(StubAgent { name: "beta", healthy: false });
        registry.register(StubAgent { name: "gamma", healthy: true });

        let healthy = registry.healthy().await;
        let types: Vec<&str> = healthy.iter().map(|a| a.agent_type()).collect();
        assert_eq!(types, vec!["alpha", "gamma"]);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_register_replaces_same_type() {
        let registry = AgentRegistry::new();
        assert!(registry.register(StubAgent { name: "alpha", healthy: false }).is_none());
        assert!(registry.register(StubAgent { name: "alpha", healthy: true }).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.healthy().await.len(), 1);

        assert!(registry.unregister("alpha").is_some());
        assert!(registry.is_empty());
        assert!(registry.get("alpha").is_none());
    }
}
