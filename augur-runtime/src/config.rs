//! Engine configuration
//!
//! Loaded from a TOML file. Every section is optional and falls back to its
//! defaults; without `[[sources]]` the built-in source list is used.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use augur_agents::CompletionOptions;
use augur_core::{default_sources, CacheConfig, SourceConfig};
use augur_sources::HttpConfig;

use crate::OrchestratorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    OpenAI,
    OpenRouter,
    /// OpenAI-compatible server at `base_url`
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Web searches allowed per call on providers that support them
    pub search_budget: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            temperature: 0.3,
            max_tokens: 1024,
            search_budget: None,
        }
    }
}

impl LlmConfig {
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_mode: false,
            search_budget: self.search_budget,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    pub llm: LlmConfig,
    pub http: HttpConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            llm: LlmConfig::default(),
            http: HttpConfig::default(),
            sources: default_sources(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be positive".into()));
        }
        if self.orchestrator.max_response_time_ms == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_response_time_ms must be positive".into(),
            ));
        }

        let mut ids = std::collections::HashSet::new();
        for source in &self.sources {
            if !ids.insert(source.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate source id: {}", source.id)));
            }
            if !(0.0..=1.0).contains(&source.reliability) {
                return Err(ConfigError::Invalid(format!(
                    "source {} reliability must be within 0..1",
                    source.id
                )));
            }
        }

        if self.llm.provider == LlmProvider::Local && self.llm.base_url.is_none() {
            return Err(ConfigError::Invalid("llm.base_url is required for the local provider".into()));
        }
        Ok(())
    }
}
