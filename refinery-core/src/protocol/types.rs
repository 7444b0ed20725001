//! Core protocol types for provider calls
//!
//! These are the only shapes that cross the adapter boundary. Backend wire
//! formats are translated to and from them inside each adapter; nothing
//! backend-specific leaks out except the opaque `raw` payload kept on
//! [`LlmResponse`] for diagnostics.

use crate::cost::currency::Currency;
use crate::providers::adapter::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// A single text-generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// System instructions
    pub system_prompt: String,

    /// User content
    pub user_prompt: String,

    /// Model override; the adapter's default model is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Output token budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Free-form caller metadata, never sent to the backend
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl LlmRequest {
    /// Create a request from a system prompt and user content
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
            max_tokens: None,
            temperature: None,
            metadata: HashMap::new(),
        }
    }

    /// Override the model for this request
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output token budget
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Total prompt length in characters (system + user)
    pub fn prompt_chars(&self) -> usize {
        self.system_prompt.chars().count() + self.user_prompt.chars().count()
    }

    /// Resolve the model to call, falling back to `default_model`
    pub fn resolve_model<'a>(&'a self, default_model: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default_model)
    }
}

/// Token usage reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build usage from input/output counts; total is their sum
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Build usage where the backend reported its own total.
    ///
    /// A missing or zero total is replaced by input + output.
    pub fn with_reported_total(input_tokens: u64, output_tokens: u64, total: Option<u64>) -> Self {
        let total_tokens = match total {
            Some(total) if total > 0 => total,
            _ => input_tokens + output_tokens,
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Cost of a call in USD, split by direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input_usd: f64,
    pub output_usd: f64,
    pub total_usd: f64,
}

impl Cost {
    /// Build a cost from its two components
    pub fn new(input_usd: f64, output_usd: f64) -> Self {
        Self {
            input_usd,
            output_usd,
            total_usd: input_usd + output_usd,
        }
    }

    /// Cost of a call to a local backend
    pub fn zero() -> Self {
        Self::default()
    }
}

/// A normalized response from any backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text (text parts only, concatenated)
    pub text: String,

    /// Token usage; zero when the backend omits it
    pub usage: TokenUsage,

    /// Which adapter served the call
    pub provider: ProviderKind,

    /// The model the backend reports, or the model requested
    pub model: String,

    /// Cost in USD computed from `usage`
    pub cost: Cost,

    /// Wall-clock duration of the call
    #[serde(with = "duration_millis")]
    pub duration: Duration,

    /// Raw backend payload, for diagnostics only
    #[serde(default)]
    pub raw: Value,
}

impl LlmResponse {
    /// Total cost in USD
    pub fn cost_usd(&self) -> f64 {
        self.cost.total_usd
    }
}

/// A model a provider can serve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    /// Informational only; deprecated models remain callable
    #[serde(default)]
    pub deprecated: bool,
}

/// Per-direction token counts and costs behind an estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub input_cost: f64,
    pub output_cost: f64,
}

/// A pre-call cost estimate. Produced without any network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub cost_usd: f64,
    pub cost_in_currency: f64,
    pub currency: Currency,
    pub exchange_rate: f64,
    /// `None` for local backends
    pub breakdown: Option<CostBreakdown>,
}

impl CostEstimate {
    /// A zero estimate with no breakdown
    pub fn zero(currency: Currency, exchange_rate: f64) -> Self {
        Self {
            cost_usd: 0.0,
            cost_in_currency: 0.0,
            currency,
            exchange_rate,
            breakdown: None,
        }
    }

    /// One-line human readable summary
    pub fn format_summary(&self) -> String {
        match &self.breakdown {
            Some(b) => format!(
                "~{} in / ~{} out tokens: {:.6} {} ({:.6} USD @ {})",
                b.input_tokens,
                b.output_tokens,
                self.cost_in_currency,
                self.currency,
                self.cost_usd,
                self.exchange_rate
            ),
            None => format!("{:.6} {} (local)", self.cost_in_currency, self.currency),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
