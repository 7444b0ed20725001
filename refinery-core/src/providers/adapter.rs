//! Provider adapter trait and shared cost logic
//!
//! [`Provider`] is the uniform contract every backend implements. Its
//! default methods are the shared base: pricing lookup with default-model
//! fallback, the `chars / 4` pre-call estimate, and the availability check.
//! Local backends opt into zero cost by returning [`CostModel::Local`].

use crate::config::{ConfigError, ProviderConfig};
use crate::cost::currency::{Currency, CurrencyConverter};
use crate::http::HttpClient;
use crate::protocol::types::{
    Cost, CostBreakdown, CostEstimate, LlmRequest, LlmResponse, ModelDescriptor, TokenUsage,
};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::pricing::{ModelCatalog, ModelPricing};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info};

/// Output tokens assumed by [`Provider::estimate_cost`] when the request
/// sets no budget
pub const DEFAULT_ESTIMATE_OUTPUT_TOKENS: u32 = 1_000;

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    Azure,
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Self-hosted backends have no credential and no per-token billing
    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }

    /// Create a provider instance of this kind from its configuration
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ConfigError> {
        Ok(match self {
            ProviderKind::Anthropic => Arc::new(crate::providers::AnthropicProvider::new(config)?),
            ProviderKind::OpenAI => Arc::new(crate::providers::OpenAIProvider::new(config)?),
            ProviderKind::Azure => Arc::new(crate::providers::AzureOpenAIProvider::new(config)?),
            ProviderKind::Gemini => Arc::new(crate::providers::GeminiProvider::new(config)?),
            ProviderKind::Ollama => Arc::new(crate::providers::OllamaProvider::new(config)?),
        })
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an adapter bills its calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostModel {
    /// Priced per token from the adapter's catalog
    Metered,
    /// Self-hosted; every call costs exactly zero
    Local,
}

/// Core provider trait that all LLM backends implement
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> ProviderKind;

    /// Model used when the request does not name one
    fn default_model(&self) -> &str;

    /// The adapter's static catalog, which is also its pricing table
    fn catalog(&self) -> &'static ModelCatalog;

    /// Send one request. The only operation that performs network I/O.
    async fn send_message(&self, request: &LlmRequest) -> ProviderResult<LlmResponse>;

    /// Billing model; metered unless overridden
    fn cost_model(&self) -> CostModel {
        CostModel::Metered
    }

    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Static catalog of models this adapter knows
    fn supported_models(&self) -> Vec<ModelDescriptor> {
        self.catalog().descriptors()
    }

    /// Pricing for `model`.
    ///
    /// Unknown models fall back to the default model's pricing; this never
    /// fails because catalogs change faster than pricing tables.
    fn pricing_for(&self, model: &str) -> ModelPricing {
        let catalog = self.catalog();
        catalog.pricing(model).unwrap_or_else(|| {
            debug!(
                provider = %self.kind(),
                model,
                default_model = self.default_model(),
                "no pricing for model, using default model pricing"
            );
            catalog
                .pricing(self.default_model())
                .unwrap_or_else(|| catalog.default_pricing())
        })
    }

    /// Cost of a call in USD
    fn calculate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Cost {
        match self.cost_model() {
            CostModel::Local => Cost::zero(),
            CostModel::Metered => self.pricing_for(model).cost(input_tokens, output_tokens),
        }
    }

    /// Pre-call estimate. Pure; performs no I/O.
    fn estimate_cost(&self, request: &LlmRequest, currency: Currency) -> CostEstimate {
        estimate_with(self, request, currency, default_converter())
    }

    /// Cheap reachability check.
    ///
    /// Sends the smallest possible request. A rejected credential still
    /// proves the backend is reachable.
    async fn is_available(&self) -> bool {
        let ping = LlmRequest::new("", "ping").with_max_tokens(1);
        availability_from(&self.send_message(&ping).await)
    }
}

/// Shared converter with the built-in rate table
pub fn default_converter() -> &'static CurrencyConverter {
    static CONVERTER: OnceLock<CurrencyConverter> = OnceLock::new();
    CONVERTER.get_or_init(CurrencyConverter::new)
}

/// `ceil((system chars + user chars) / 4)`.
///
/// An order-of-magnitude heuristic, not a tokenizer.
pub fn estimate_input_tokens(request: &LlmRequest) -> u64 {
    (request.prompt_chars() as u64).div_ceil(4)
}

/// Estimate the cost of `request` on `provider` with an explicit converter
pub fn estimate_with<P: Provider + ?Sized>(
    provider: &P,
    request: &LlmRequest,
    currency: Currency,
    converter: &CurrencyConverter,
) -> CostEstimate {
    let rate = converter.rate(currency);
    if provider.cost_model() == CostModel::Local {
        return CostEstimate::zero(currency, rate);
    }

    let model = request.resolve_model(provider.default_model());
    let input_tokens = estimate_input_tokens(request);
    let output_tokens = u64::from(request.max_tokens.unwrap_or(DEFAULT_ESTIMATE_OUTPUT_TOKENS));
    let cost = provider.calculate_cost(model, input_tokens, output_tokens);

    CostEstimate {
        cost_usd: cost.total_usd,
        cost_in_currency: cost.total_usd * rate,
        currency,
        exchange_rate: rate,
        breakdown: Some(CostBreakdown {
            input_tokens,
            output_tokens,
            input_cost_usd: cost.input_usd,
            output_cost_usd: cost.output_usd,
            input_cost: cost.input_usd * rate,
            output_cost: cost.output_usd * rate,
        }),
    }
}

/// Interpret the result of an availability check
pub fn availability_from<T>(result: &ProviderResult<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(ProviderError::Authentication { .. }) | Err(ProviderError::RateLimited { .. }) => true,
        Err(ProviderError::Unavailable { .. }) | Err(ProviderError::Provider { .. }) => false,
    }
}

/// Backend reply after wire-format parsing, before costing
#[derive(Debug, Clone)]
pub(crate) struct ParsedReply {
    pub text: String,
    pub usage: TokenUsage,
    /// Model reported by the backend, if any
    pub model: Option<String>,
    pub raw: Value,
}

/// Cost a parsed reply and wrap it in a normalized response
pub(crate) fn finish_response<P: Provider + ?Sized>(
    provider: &P,
    requested_model: &str,
    reply: ParsedReply,
    started: Instant,
) -> LlmResponse {
    let cost = provider.calculate_cost(
        requested_model,
        reply.usage.input_tokens,
        reply.usage.output_tokens,
    );
    let duration = started.elapsed();
    let model = reply
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| requested_model.to_string());

    info!(
        provider = %provider.kind(),
        model = %model,
        input_tokens = reply.usage.input_tokens,
        output_tokens = reply.usage.output_tokens,
        cost_usd = cost.total_usd,
        duration_ms = duration.as_millis() as u64,
        "provider call completed"
    );

    LlmResponse {
        text: reply.text,
        usage: reply.usage,
        provider: provider.kind(),
        model,
        cost,
        duration,
        raw: reply.raw,
    }
}

/// HTTP client honoring a provider's configured timeout
pub(crate) fn client_for(config: &ProviderConfig) -> Result<HttpClient, ConfigError> {
    HttpClient::new(config.timeout()).map_err(|e| ConfigError::ProviderSetup {
        provider: config.kind,
        message: format!("failed to build HTTP client: {}", e),
    })
}

/// Model a provider should use when requests name none
pub(crate) fn configured_model(config: &ProviderConfig, catalog: &ModelCatalog) -> String {
    config
        .default_model
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| catalog.default_model.to_string())
}

/// Clamp a temperature into a backend's accepted range
pub(crate) fn clamp_temperature(temperature: Option<f32>, max: f32) -> Option<f32> {
    temperature.map(|t| if t.is_finite() { t.clamp(0.0, max) } else { 0.0 })
}

/// Read a non-negative integer counter from a JSON envelope
pub(crate) fn counter(value: &Value, pointer: &str) -> u64 {
    value.pointer(pointer).and_then(Value::as_u64).unwrap_or(0)
}
