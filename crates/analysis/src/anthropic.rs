//! Anthropic Claude Provider
//!
//! Implementation of the AnalysisProvider trait for Anthropic's Claude API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::json_extract::extract_json;
use crate::provider::{missing_api_key_error, parse_http_error, AnalysisProvider};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::{AnalysisError, AnalysisResult, InferenceRequest, ProviderConfig};

/// Default Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Current API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// System prompt applied to every inference call. Keeps responses machine
/// readable so the JSON extractor has something to work with.
const SYSTEM_PROMPT: &str = "You are a forensic document analyst. Respond with a single JSON \
value that follows the schema described in the task. Do not include any prose outside the JSON.";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    config: ProviderConfig,
    retry: RetryConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            retry: RetryConfig::default(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Build the request body for the API
    fn build_request_body(&self, request: &InferenceRequest) -> Value {
        let user_content = format!("{}\n\n---\n\n{}", request.task_prompt, request.input);
        serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": user_content
            }]
        })
    }

    /// Send one request and return the first text block of the response
    async fn send_once(&self, api_key: &str, body: &Value) -> AnalysisResult<String> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let body_text = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status, &body_text, retry_after));
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let claude_response: ClaudeResponse =
            serde_json::from_str(&body_text).map_err(|e| AnalysisError::Parse {
                message: format!("Failed to parse response envelope: {}", e),
            })?;

        claude_response
            .first_text()
            .map(|t| t.to_string())
            .ok_or_else(|| AnalysisError::Parse {
                message: "Response contained no text content".to_string(),
            })
    }

    fn map_request_error(&self, error: reqwest::Error) -> AnalysisError {
        if error.is_timeout() {
            AnalysisError::Timeout {
                seconds: self.config.timeout_secs,
            }
        } else {
            AnalysisError::Network {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl AnalysisProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.resolve_api_key().is_some()
    }

    async fn infer(&self, request: InferenceRequest) -> AnalysisResult<Value> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| missing_api_key_error("anthropic"))?;

        let body = self.build_request_body(&request);
        let text = retry_with_backoff(&self.retry, || self.send_once(&api_key, &body)).await?;
        extract_json(&text)
    }

    async fn health_check(&self) -> AnalysisResult<()> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| missing_api_key_error("anthropic"))?;

        // Minimal request to verify the API key
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "Hi"}]
        });

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let body_text = response.text().await.unwrap_or_default();
            Err(parse_http_error(status, &body_text, None))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Claude API response format
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ContentBlock>,
}

impl ClaudeResponse {
    fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}
