//! Provider abstraction layer
//!
//! One [`Provider`] implementation per backend, a shared pricing and
//! estimation base, per-backend failure classification, and the retry
//! controller that wraps calls.

pub mod adapter;
pub mod anthropic;
pub mod azure;
pub mod error;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod retry;

pub use adapter::{
    availability_from, estimate_input_tokens, estimate_with, CostModel, Provider, ProviderKind,
    DEFAULT_ESTIMATE_OUTPUT_TOKENS,
};
pub use error::{ProviderError, ProviderResult};
pub use pricing::{CatalogEntry, ModelCatalog, ModelPricing};
pub use retry::{RetryError, RetryExecutor, RetryOutcome, RetryPolicy};

// Re-export concrete providers
pub use anthropic::AnthropicProvider;
pub use azure::AzureOpenAIProvider;
pub use gemini::GeminiProvider;
pub use ollama::{InstalledModel, OllamaProvider};
pub use openai::OpenAIProvider;

/// Static catalog of a backend, without constructing a provider
pub fn catalog_for(kind: ProviderKind) -> &'static ModelCatalog {
    match kind {
        ProviderKind::Anthropic => &anthropic::CATALOG,
        ProviderKind::OpenAI => &openai::CATALOG,
        ProviderKind::Azure => &azure::CATALOG,
        ProviderKind::Gemini => &gemini::CATALOG,
        ProviderKind::Ollama => &ollama::CATALOG,
    }
}
