//! Analysis Provider Types
//!
//! Shared request, configuration, and error types for structured-analysis
//! providers.

use serde::{Deserialize, Serialize};

/// One structured-analysis call: a task instruction plus the document or
/// claim payload it applies to. The provider returns extracted JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// What to analyze and the JSON schema to answer with
    pub task_prompt: String,
    /// Document or claim text the task applies to
    pub input: String,
}

impl InferenceRequest {
    pub fn new(task_prompt: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            task_prompt: task_prompt.into(),
            input: input.into(),
        }
    }
}

/// Configuration for an analysis provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; falls back to the ANTHROPIC_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Configured key, or the conventional environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }
}

/// Errors from structured-analysis calls
#[derive(Debug, Clone)]
pub enum AnalysisError {
    /// Non-success HTTP status from the provider
    Http { status: u16, message: String },
    /// Network/connection error
    Network { message: String },
    /// The response body did not contain usable JSON
    Parse { message: String },
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// No API key available
    NotConfigured { provider: String },
    /// The call exceeded the configured timeout
    Timeout { seconds: u64 },
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Http { status, message } => {
                write!(f, "HTTP {} from provider: {}", status, message)
            }
            AnalysisError::Network { message } => {
                write!(f, "Network error: {}", message)
            }
            AnalysisError::Parse { message } => {
                write!(f, "Parse error: {}", message)
            }
            AnalysisError::RateLimited { retry_after_secs } => match retry_after_secs {
                Some(secs) => write!(f, "Rate limited, retry after {}s", secs),
                None => write!(f, "Rate limited"),
            },
            AnalysisError::NotConfigured { provider } => {
                write!(f, "Provider {} is not configured", provider)
            }
            AnalysisError::Timeout { seconds } => {
                write!(f, "Request timed out after {}s", seconds)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

impl AnalysisError {
    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Http { status, .. } => is_retryable_status(*status),
            AnalysisError::Network { .. } => true,
            AnalysisError::RateLimited { .. } => true,
            AnalysisError::Timeout { .. } => true,
            AnalysisError::Parse { .. } => false,
            AnalysisError::NotConfigured { .. } => false,
        }
    }
}

/// Transient provider statuses worth retrying
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
