//! Analysis Provider Trait
//!
//! Defines the common interface for inference backends used by the
//! lineage pipeline.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{AnalysisError, AnalysisResult, InferenceRequest, ProviderConfig};

/// Trait that all analysis providers must implement.
///
/// Providers take a task prompt plus input text and return structured
/// JSON. Callers own the schema of that JSON; the provider only
/// guarantees it parsed.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Returns whether the provider has the credentials it needs.
    fn is_configured(&self) -> bool;

    /// Run one inference call and parse the response as JSON.
    async fn infer(&self, request: InferenceRequest) -> AnalysisResult<Value>;

    /// Check if the provider is reachable and its credentials work.
    async fn health_check(&self) -> AnalysisResult<()>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> AnalysisError {
    AnalysisError::NotConfigured {
        provider: provider.to_string(),
    }
}

/// Helper function to map HTTP error status codes onto analysis errors
pub fn parse_http_error(status: u16, body: &str, retry_after_secs: Option<u64>) -> AnalysisError {
    match status {
        429 => AnalysisError::RateLimited { retry_after_secs },
        _ => AnalysisError::Http {
            status,
            message: body.to_string(),
        },
    }
}
