//! Provider error types and handling

use crate::providers::adapter::ProviderKind;
use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Classified failure of a provider call.
///
/// Every backend error is mapped into exactly one of these variants by the
/// adapter's `classify_failure` function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Credential rejected (HTTP 401/403 class). Never retried.
    #[error("{provider}: authentication failed: {message}")]
    Authentication {
        provider: ProviderKind,
        message: String,
    },

    /// Rate limit exceeded (HTTP 429 class)
    #[error("{provider}: rate limit exceeded: {message}")]
    RateLimited {
        provider: ProviderKind,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Connection-level failure: DNS, connection refused, timeout
    #[error("{provider}: service unavailable: {message}")]
    Unavailable {
        provider: ProviderKind,
        message: String,
    },

    /// Anything else the backend reported
    #[error("{provider}: provider error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Provider {
        provider: ProviderKind,
        status: Option<u16>,
        message: String,
    },
}

impl ProviderError {
    /// Whether the retry controller may try this call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }

    /// Suggested wait carried by a rate-limit response
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The provider that raised the error
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Authentication { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Unavailable { provider, .. }
            | Self::Provider { provider, .. } => *provider,
        }
    }

    /// Short, stable name of the error class for logs
    pub fn class(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unavailable { .. } => "unavailable",
            Self::Provider { .. } => "provider",
        }
    }

    pub(crate) fn generic(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            status: None,
            message: message.into(),
        }
    }
}
