//! Retry Logic
//!
//! Exponential backoff with jitter for transient provider errors. Which
//! errors count as transient is decided by `AnalysisError::is_retryable`.

use std::future::Future;
use std::time::Duration;

use crate::types::{AnalysisError, AnalysisResult};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential growth)
    pub max_delay_ms: u64,
    /// Jitter range in milliseconds to add randomness
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            jitter_ms: 250,
        }
    }
}

/// Calculate delay for a given attempt using exponential backoff with jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped = base.min(config.max_delay_ms);

    // Simple pseudo-random jitter from the system clock
    let jitter = if config.jitter_ms > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        now % config.jitter_ms
    } else {
        0
    };

    Duration::from_millis(capped.saturating_add(jitter))
}

/// Run an operation, retrying transient failures with backoff. A rate-limit
/// response with an explicit retry-after wins over the computed delay.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> AnalysisResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AnalysisResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts => {
                let delay = match &err {
                    AnalysisError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => calculate_delay(attempt, config),
                };
                tracing::warn!(
                    attempt = attempt + 1,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "analysis call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
