//! ClaimTrace Analysis
//!
//! Provides the inference layer for the claim lineage pipeline:
//! - The `AnalysisProvider` trait that pipeline phases call
//! - An Anthropic Claude implementation
//! - JSON extraction from model output
//! - Retry with exponential backoff for transient failures

pub mod anthropic;
pub mod json_extract;
pub mod provider;
pub mod retry;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use json_extract::extract_json;
pub use provider::AnalysisProvider;
pub use retry::{retry_with_backoff, RetryConfig};
pub use types::*;
