//! Retry policy and executor for provider calls
//!
//! Only `RateLimited` and `Unavailable` failures are retried. The delay
//! before retry `k` (1-based) is `base_delay * 2^(k-1)`, capped at
//! `max_delay_ms`. Authentication and generic provider errors propagate on
//! the first attempt.

use crate::config::{ProviderConfig, ValidationError};
use crate::protocol::types::{LlmRequest, LlmResponse};
use crate::providers::adapter::Provider;
use crate::providers::error::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum number of retries (not including the initial attempt)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0) applied symmetrically to each delay
    #[serde(default)]
    pub jitter_factor: f64,

    /// Wait for the backend's retry-after hint instead of the computed delay
    #[serde(default)]
    pub respect_retry_after: bool,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    1_000
}
fn default_max_delay() -> u64 {
    60_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_factor: 0.0,
            respect_retry_after: false,
        }
    }
}

impl RetryPolicy {
    /// Default policy with a custom retry count
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay_ms = base_delay.as_millis() as u64;
        self
    }

    /// A policy with no retries
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Few retries, long waits: minimizes load on a struggling backend
    pub fn conservative() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
            respect_retry_after: true,
        }
    }

    /// More retries, short waits: for batch steps that must complete
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_factor: 0.1,
            respect_retry_after: true,
        }
    }

    /// Default policy with a provider's `max_retries` override applied
    pub fn from_provider_config(config: &ProviderConfig) -> Self {
        Self::default().for_provider(config)
    }

    /// This policy with a provider's `max_retries` override applied; the
    /// provider setting wins when present
    pub fn for_provider(&self, config: &ProviderConfig) -> Self {
        Self {
            max_retries: config.max_retries.unwrap_or(self.max_retries),
            ..self.clone()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn calculate_delay(&self, retry: u32, error: &ProviderError) -> Duration {
        if self.respect_retry_after {
            if let Some(hint) = error.retry_after() {
                return hint.min(Duration::from_millis(self.max_delay_ms));
            }
        }

        let exponent = retry.saturating_sub(1).min(63);
        let base = (self.base_delay_ms as f64) * 2f64.powi(exponent as i32);
        let capped = base.min(self.max_delay_ms as f64);

        let delayed = if self.jitter_factor > 0.0 {
            let range = capped * self.jitter_factor.min(1.0);
            let jitter = rand::thread_rng().gen_range(-range..=range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(delayed as u64)
    }

    /// Whether a failure on attempt `attempt` (1-based) may be retried
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt <= self.max_retries && error.is_retryable()
    }

    /// Validate retry policy
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.base_delay_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.base_delay_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(ValidationError::out_of_range(
                format!("{}.max_delay_ms", path),
                "Must be >= base_delay_ms",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

/// A call that failed for good, with the number of attempts made
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{source} (after {attempts} attempt{})", if *.attempts == 1 { "" } else { "s" })]
pub struct RetryError {
    pub attempts: u32,
    /// The last error observed, unchanged
    #[source]
    pub source: ProviderError,
}

impl RetryError {
    /// The underlying classified error
    pub fn error(&self) -> &ProviderError {
        &self.source
    }

    pub fn into_inner(self) -> ProviderError {
        self.source
    }
}

/// Result of a retried operation.
///
/// Only [`RetryExecutor::execute`] builds one, so an outcome always holds
/// either the value or the error that ended the loop.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    result: Result<T, ProviderError>,
    attempts: u32,
    total_delay: Duration,
    /// Failures that were followed by another attempt, oldest first
    retried: Vec<ProviderError>,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Attempts made, including the first
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total time spent sleeping between attempts
    pub fn total_delay(&self) -> Duration {
        self.total_delay
    }

    /// Every error encountered, oldest first, including the final one
    pub fn error_history(&self) -> Vec<&ProviderError> {
        self.retried.iter().chain(self.result.as_ref().err()).collect()
    }

    /// The result, or the last error annotated with the attempt count
    pub fn into_result(self) -> Result<T, RetryError> {
        let attempts = self.attempts;
        self.result.map_err(|source| RetryError { attempts, source })
    }
}

/// Executor for retry operations
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, T, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0;
        let mut total_delay = Duration::ZERO;
        let mut retried = Vec::new();

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!(attempts, "operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(result),
                        attempts,
                        total_delay,
                        retried,
                    };
                }
                Err(error) => {
                    let retry = self.policy.should_retry(&error, attempts);
                    if !retry {
                        if error.is_retryable() {
                            warn!(attempts, error = %error, "retries exhausted");
                        }
                        return RetryOutcome {
                            result: Err(error),
                            attempts,
                            total_delay,
                            retried,
                        };
                    }

                    let delay = self.policy.calculate_delay(attempts, &error);
                    warn!(
                        provider = %error.provider(),
                        class = error.class(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying provider call"
                    );
                    retried.push(error);
                    total_delay += delay;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Execute an operation and return its result or a [`RetryError`]
    pub async fn run<F, T, Fut>(&self, operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.execute(operation).await.into_result()
    }

    /// Send `request` through `provider` under this policy
    pub async fn execute_request<P: Provider + ?Sized>(
        &self,
        provider: &P,
        request: &LlmRequest,
    ) -> Result<LlmResponse, RetryError> {
        self.run(|| provider.send_message(request)).await
    }
}
