//! Refinery Core Library
//!
//! The provider layer of the transcript-to-backlog pipeline: one contract
//! over Anthropic, OpenAI, Azure OpenAI, Gemini and Ollama, with cost
//! accounting, failure classification and retry, and recovery of
//! structured data from model output.
//!
//! ```no_run
//! use refinery_core::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = refinery_core::config::load("refinery.yaml")?;
//! let providers = config.build_providers()?;
//! let provider = &providers[&ProviderKind::Anthropic];
//!
//! let request = LlmRequest::new("Extract backlog items as JSON.", "...transcript...");
//! let estimate = provider.estimate_cost(&request, Currency::Eur);
//! println!("{}", estimate.format_summary());
//!
//! // `retry` policy, with the provider's own `max_retries` if it sets one
//! let executor = config.retry_executor(ProviderKind::Anthropic);
//! let response = executor.execute_request(provider.as_ref(), &request).await?;
//!
//! let tracker = CostTracker::new();
//! tracker.record_response("extract", &response);
//!
//! let items: Vec<serde_json::Value> = parse_value(&response.text)?;
//! # let _ = items;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cost;
pub mod extract;
pub mod http;
pub mod protocol;
pub mod providers;

/// The types most callers need
pub mod prelude {
    pub use crate::config::{ProviderConfig, RefineryConfig};
    pub use crate::cost::{CostTracker, Currency, LedgerWriter};
    pub use crate::extract::{parse_structured, parse_value, Extracted, StructuredParseError};
    pub use crate::protocol::{CostEstimate, LlmRequest, LlmResponse, ModelDescriptor, TokenUsage};
    pub use crate::providers::{
        Provider, ProviderError, ProviderKind, RetryExecutor, RetryPolicy,
    };
}

/// Returns the version of the Refinery Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
