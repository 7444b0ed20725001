//! Anthropic provider implementation
//!
//! Talks to the Messages API. The system prompt travels in the dedicated
//! `system` field and `max_tokens` is mandatory on the wire.

use crate::config::{ConfigError, ProviderConfig, SecretString};
use crate::http::{classify_common, json_headers, HttpClient, RawFailure};
use crate::protocol::types::{LlmRequest, LlmResponse, TokenUsage};
use crate::providers::adapter::{
    clamp_temperature, client_for, configured_model, counter, finish_response, ParsedReply,
    Provider, ProviderKind,
};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::openai::ChatMessage;
use crate::providers::pricing::{CatalogEntry, ModelCatalog, ModelPricing};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";

/// `max_tokens` sent when the request sets none
pub const DEFAULT_MAX_TOKENS: u32 = 4_096;

pub static CATALOG: ModelCatalog = ModelCatalog {
    default_model: "claude-3-5-haiku-20241022",
    entries: &[
        CatalogEntry::new(
            "claude-3-5-haiku-20241022",
            "Claude 3.5 Haiku",
            200_000,
            ModelPricing::new(0.80, 4.00),
        )
        .describe("Fastest model, suited to extraction and classification steps"),
        CatalogEntry::new(
            "claude-3-5-sonnet-20241022",
            "Claude 3.5 Sonnet",
            200_000,
            ModelPricing::new(3.00, 15.00),
        ),
        CatalogEntry::new(
            "claude-3-7-sonnet-20250219",
            "Claude 3.7 Sonnet",
            200_000,
            ModelPricing::new(3.00, 15.00),
        ),
        CatalogEntry::new(
            "claude-sonnet-4-20250514",
            "Claude Sonnet 4",
            200_000,
            ModelPricing::new(3.00, 15.00),
        )
        .describe("Balanced quality and cost for refinement steps"),
        CatalogEntry::new(
            "claude-opus-4-20250514",
            "Claude Opus 4",
            200_000,
            ModelPricing::new(15.00, 75.00),
        ),
        CatalogEntry::new(
            "claude-3-opus-20240229",
            "Claude 3 Opus",
            200_000,
            ModelPricing::new(15.00, 75.00),
        )
        .deprecated(),
        CatalogEntry::new(
            "claude-3-haiku-20240307",
            "Claude 3 Haiku",
            200_000,
            ModelPricing::new(0.25, 1.25),
        )
        .deprecated(),
    ],
};

/// Anthropic provider implementation
#[derive(Debug)]
pub struct AnthropicProvider {
    client: HttpClient,
    api_key: SecretString,
    base_url: String,
    default_model: String,
}

impl AnthropicProvider {
    /// Create a provider from its configuration. Requires an API key.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: client_for(config)?,
            api_key: config.require_api_key()?.clone(),
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            default_model: configured_model(config, &CATALOG),
        })
    }

    fn request_body<'a>(&self, request: &'a LlmRequest, model: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: Some(request.system_prompt.as_str()).filter(|s| !s.is_empty()),
            messages: vec![ChatMessage {
                role: "user",
                content: &request.user_prompt,
            }],
            temperature: clamp_temperature(request.temperature, 1.0),
        }
    }
}

/// Messages API request body
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn catalog(&self) -> &'static ModelCatalog {
        &CATALOG
    }

    async fn send_message(&self, request: &LlmRequest) -> ProviderResult<LlmResponse> {
        let model = request.resolve_model(&self.default_model).to_string();
        let url = format!("{}/v1/messages", self.base_url);
        let headers = json_headers([
            ("x-api-key", self.api_key.expose_secret()),
            ("anthropic-version", API_VERSION),
        ]);

        debug!(provider = "anthropic", model = %model, "sending message");
        let started = Instant::now();
        let body = self
            .client
            .post_json(&url, headers, &self.request_body(request, &model))
            .await
            .map_err(|f| classify_failure(&f))?;

        let reply = parse_reply(body)?;
        Ok(finish_response(self, &model, reply, started))
    }
}

fn parse_reply(body: Value) -> ProviderResult<ParsedReply> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ProviderError::generic(ProviderKind::Anthropic, "response has no content array")
        })?;

    let text = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<String>();

    let usage = TokenUsage::new(
        counter(&body, "/usage/input_tokens"),
        counter(&body, "/usage/output_tokens"),
    );
    let model = body.get("model").and_then(Value::as_str).map(str::to_string);

    Ok(ParsedReply {
        text,
        usage,
        model,
        raw: body,
    })
}

/// Classify a failed Messages API call
pub fn classify_failure(failure: &RawFailure) -> ProviderError {
    let provider = ProviderKind::Anthropic;
    if let Some(details) = failure.details() {
        if details.code_is(&["authentication_error", "permission_error"]) {
            return ProviderError::Authentication {
                provider,
                message: details.message,
            };
        }
        if details.code_is(&["rate_limit_error"]) {
            return ProviderError::RateLimited {
                provider,
                message: details.message,
                retry_after: failure.retry_after(),
            };
        }
        if details.code_is(&["overloaded_error"]) {
            return ProviderError::Unavailable {
                provider,
                message: details.message,
            };
        }
    }
    classify_common(provider, failure)
}
