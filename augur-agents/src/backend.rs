//! Text-completion backends
//!
//! Supports OpenAI-compatible APIs (OpenAI, OpenRouter, local servers) and
//! Anthropic Claude. Callers get plain text back and must tolerate output
//! that is not the JSON they asked for.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// LLM backend errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Empty response")]
    EmptyResponse,
}

/// Per-call generation settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a single JSON object
    pub json_mode: bool,
    /// Maximum web searches the provider may run, when it supports them
    pub search_budget: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            json_mode: false,
            search_budget: None,
        }
    }
}

impl CompletionOptions {
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_search_budget(mut self, budget: u32) -> Self {
        self.search_budget = Some(budget);
        self
    }
}

/// Generic LLM backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a completion with system prompt
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Whether the backend has what it needs to make calls
    fn is_configured(&self) -> bool {
        true
    }
}

const JSON_INSTRUCTION: &str = "Respond with a single JSON object and nothing else.";

/// OpenAI-compatible backend configuration
#[derive(Debug, Clone)]
pub struct OpenAIBackendConfig {
    /// API key
    pub api_key: String,
    /// Base URL (for OpenRouter, local servers, etc.)
    pub base_url: Option<String>,
    /// Model name
    pub model: String,
}

impl Default for OpenAIBackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl OpenAIBackendConfig {
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn openrouter(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: Some("https://openrouter.ai/api/v1".to_string()),
            model: model.to_string(),
        }
    }

    pub fn local(base_url: &str, model: &str) -> Self {
        Self {
            api_key: "sk-local".to_string(),
            base_url: Some(base_url.to_string()),
            model: model.to_string(),
        }
    }
}

/// OpenAI-compatible LLM backend
pub struct OpenAIBackend {
    client: Client<OpenAIConfig>,
    config: OpenAIBackendConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIBackendConfig) -> Result<Self, LlmError> {
        if config.model.is_empty() {
            return Err(LlmError::Config("model name is empty".into()));
        }

        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        let client = Client::with_config(openai_config);

        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        if options.search_budget.is_some() {
            debug!("Search budget ignored by {}", self.config.model);
        }

        let system = if options.json_mode {
            format!("{}\n\n{}", system, JSON_INSTRUCTION)
        } else {
            system.to_string()
        };

        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| LlmError::Api(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| LlmError::Api(e.to_string()))?,
            ),
        ];

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(&self.config.model)
            .messages(messages)
            .temperature(options.temperature)
            .max_tokens(options.max_tokens);
        if options.json_mode {
            request.response_format(ResponseFormat::JsonObject);
        }
        let request = request.build().map_err(|e| LlmError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

/// Anthropic Claude backend configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key
    pub api_key: String,
    /// Model name (e.g., claude-sonnet-4-20250514)
    pub model: String,
    /// API root, without the `/v1/messages` path
    pub base_url: String,
}

impl AnthropicConfig {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

/// Anthropic Claude backend
pub struct AnthropicBackend {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        if config.model.is_empty() {
            return Err(LlmError::Config("model name is empty".into()));
        }
        let client = reqwest::Client::new();
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let system = if options.json_mode {
            format!("{}\n\n{}", system, JSON_INSTRUCTION)
        } else {
            system.to_string()
        };

        let mut request_body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "system": system,
            "messages": [
                {"role": "user", "content": user}
            ]
        });

        if let Some(max_uses) = options.search_budget.filter(|n| *n > 0) {
            request_body["tools"] = serde_json::json!([{
                "type": "web_search_20250305",
                "name": "web_search",
                "max_uses": max_uses
            }]);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Anthropic API error {}: {}", status, text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        // With web search the answer is split across several text blocks
        let text: Vec<&str> = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| block["type"] == "text")
                    .filter_map(|block| block["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        let joined = text.join("");
        if joined.trim().is_empty() {
            Err(LlmError::EmptyResponse)
        } else {
            Ok(joined)
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

/// Thread-safe reference to an LLM backend
pub type SharedBackend = Arc<dyn LlmBackend>;

/// Create a shared OpenAI-compatible backend
pub fn create_backend(config: OpenAIBackendConfig) -> Result<SharedBackend, LlmError> {
    Ok(Arc::new(OpenAIBackend::new(config)?))
}

/// Create a shared Anthropic backend
pub fn create_anthropic_backend(config: AnthropicConfig) -> Result<SharedBackend, LlmError> {
    Ok(Arc::new(AnthropicBackend::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_options_builders() {
        let options = CompletionOptions::default().json().with_search_budget(3);
        assert!(options.json_mode);
        assert_eq!(options.search_budget, Some(3));
    }

    #[test]
    fn test_empty_model_rejected() {
        assert!(matches!(
            AnthropicBackend::new(AnthropicConfig::new("key", "")),
            Err(LlmError::Config(_))
        ));
        assert!(OpenAIBackend::new(OpenAIBackendConfig::openai("key", "gpt-4o-mini")).is_ok());
    }

    #[tokio::test]
    async fn test_anthropic_joins_text_blocks_and_sends_search_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{"name": "web_search", "max_uses": 2}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "{\"answer\":"},
                    {"type": "server_tool_use", "name": "web_search"},
                    {"type": "text", "text": " 42}"}
                ]
            })))
            .mount(&server)
            .await;

        let backend =
            AnthropicBackend::new(AnthropicConfig::new("test-key", "claude").with_base_url(&server.uri()))
                .unwrap();
        let options = CompletionOptions::default().json().with_search_budget(2);
        let text = backend.complete("system", "user", &options).await.unwrap();
        assert_eq!(text, "{\"answer\": 42}");
    }

    #[tokio::test]
    async fn test_anthropic_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let backend =
            AnthropicBackend::new(AnthropicConfig::new("k", "claude").with_base_url(&server.uri()))
                .unwrap();
        let result = backend
            .complete("s", "u", &CompletionOptions::default())
            .await;
        assert!(matches!(result, Err(LlmError::RateLimited)));
    }
}
