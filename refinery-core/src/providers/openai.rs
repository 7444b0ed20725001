//! OpenAI provider implementation
//!
//! Chat Completions over `Authorization: Bearer`. The chat body and reply
//! parsing are shared with the Azure deployment adapter, which speaks the
//! same wire format.

use crate::config::{ConfigError, ProviderConfig, SecretString};
use crate::http::{classify_common, json_headers, HttpClient, RawFailure};
use crate::protocol::types::{LlmRequest, LlmResponse, TokenUsage};
use crate::providers::adapter::{
    clamp_temperature, client_for, configured_model, counter, finish_response, ParsedReply,
    Provider, ProviderKind,
};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::pricing::{CatalogEntry, ModelCatalog, ModelPricing};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Models served by both OpenAI and Azure deployments
pub(crate) const OPENAI_MODELS: &[CatalogEntry] = &[
    CatalogEntry::new("gpt-4o-mini", "GPT-4o mini", 128_000, ModelPricing::new(0.15, 0.60))
        .describe("Low-cost general model"),
    CatalogEntry::new("gpt-4o", "GPT-4o", 128_000, ModelPricing::new(2.50, 10.00)),
    CatalogEntry::new("gpt-4.1", "GPT-4.1", 1_047_576, ModelPricing::new(2.00, 8.00)),
    CatalogEntry::new("gpt-4.1-mini", "GPT-4.1 mini", 1_047_576, ModelPricing::new(0.40, 1.60)),
    CatalogEntry::new("gpt-4.1-nano", "GPT-4.1 nano", 1_047_576, ModelPricing::new(0.10, 0.40)),
    CatalogEntry::new("o3-mini", "o3-mini", 200_000, ModelPricing::new(1.10, 4.40))
        .describe("Reasoning model"),
    CatalogEntry::new("gpt-4-turbo", "GPT-4 Turbo", 128_000, ModelPricing::new(10.00, 30.00))
        .deprecated(),
    CatalogEntry::new("gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385, ModelPricing::new(0.50, 1.50))
        .deprecated(),
];

pub static CATALOG: ModelCatalog = ModelCatalog {
    default_model: "gpt-4o-mini",
    entries: OPENAI_MODELS,
};

/// OpenAI provider implementation
#[derive(Debug)]
pub struct OpenAIProvider {
    client: HttpClient,
    api_key: SecretString,
    organization: Option<String>,
    base_url: String,
    default_model: String,
}

impl OpenAIProvider {
    /// Create a provider from its configuration.
    ///
    /// `extra.organization` is sent as the `OpenAI-Organization` header.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: client_for(config)?,
            api_key: config.require_api_key()?.clone(),
            organization: config.extra_str("organization").map(str::to_string),
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            default_model: configured_model(config, &CATALOG),
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn catalog(&self) -> &'static ModelCatalog {
        &CATALOG
    }

    async fn send_message(&self, request: &LlmRequest) -> ProviderResult<LlmResponse> {
        let model = request.resolve_model(&self.default_model).to_string();
        let url = format!("{}/v1/chat/completions", self.base_url);
        let bearer = format!("Bearer {}", self.api_key.expose_secret());
        let mut pairs = vec![("authorization", bearer.as_str())];
        if let Some(org) = &self.organization {
            pairs.push(("openai-organization", org.as_str()));
        }

        debug!(provider = "openai", model = %model, "sending chat completion");
        let started = Instant::now();
        let body = self
            .client
            .post_json(&url, json_headers(pairs), &chat_body(request, &model))
            .await
            .map_err(|f| classify_failure(&f))?;

        let reply = parse_chat_completion(ProviderKind::OpenAI, body)?;
        Ok(finish_response(self, &model, reply, started))
    }
}

/// One chat message on the wire
#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// System message (when present) followed by the user message
pub(crate) fn chat_messages(request: &LlmRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.user_prompt,
    });
    messages
}

/// Chat Completions request body
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest<'_> {
    /// Azure selects the model from the deployment, so the body names none
    pub(crate) fn for_deployment(self) -> Self {
        Self { model: None, ..self }
    }
}

/// Reasoning models (`o1`, `o3-mini`, `o4-mini`, ...) take
/// `max_completion_tokens` and only the default temperature
pub(crate) fn is_reasoning_model(model: &str) -> bool {
    let mut chars = model.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Build the body for `model`, applying that model family's parameter rules
pub(crate) fn chat_body<'a>(request: &'a LlmRequest, model: &'a str) -> ChatRequest<'a> {
    let temperature = clamp_temperature(request.temperature, 2.0);
    if is_reasoning_model(model) {
        if temperature.is_some() {
            debug!(model = %model, "temperature not supported by reasoning models; dropped");
        }
        return ChatRequest {
            model: Some(model),
            messages: chat_messages(request),
            max_tokens: None,
            max_completion_tokens: request.max_tokens,
            temperature: None,
        };
    }
    ChatRequest {
        model: Some(model),
        messages: chat_messages(request),
        max_tokens: request.max_tokens,
        max_completion_tokens: None,
        temperature,
    }
}

/// Parse a Chat Completions reply
pub(crate) fn parse_chat_completion(kind: ProviderKind, body: Value) -> ProviderResult<ParsedReply> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| ProviderError::generic(kind, "response has no choices"))?;

    // A refusal or tool call leaves content null
    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let usage = TokenUsage::with_reported_total(
        counter(&body, "/usage/prompt_tokens"),
        counter(&body, "/usage/completion_tokens"),
        body.pointer("/usage/total_tokens").and_then(Value::as_u64),
    );
    let model = body.get("model").and_then(Value::as_str).map(str::to_string);

    Ok(ParsedReply {
        text,
        usage,
        model,
        raw: body,
    })
}

/// Error codes shared by OpenAI and Azure
pub(crate) fn classify_chat_failure(provider: ProviderKind, failure: &RawFailure) -> ProviderError {
    if let Some(details) = failure.details() {
        if details.code_is(&["invalid_api_key", "401"]) {
            return ProviderError::Authentication {
                provider,
                message: details.message,
            };
        }
        if details.code_is(&["rate_limit_exceeded", "429"]) {
            return ProviderError::RateLimited {
                provider,
                message: details.message,
                retry_after: failure.retry_after(),
            };
        }
    }
    classify_common(provider, failure)
}

/// Classify a failed Chat Completions call
pub fn classify_failure(failure: &RawFailure) -> ProviderError {
    classify_chat_failure(ProviderKind::OpenAI, failure)
}
