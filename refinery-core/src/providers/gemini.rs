//! Google Gemini provider implementation
//!
//! `generateContent` on the v1beta API. The system prompt is sent as
//! `systemInstruction`; token limits and temperature go in
//! `generationConfig`.

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
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub static CATALOG: ModelCatalog = ModelCatalog {
    default_model: "gemini-2.0-flash",
    entries: &[
        CatalogEntry::new("gemini-2.0-flash", "Gemini 2.0 Flash", 1_048_576, ModelPricing::new(0.10, 0.40)),
        CatalogEntry::new(
            "gemini-2.0-flash-lite",
            "Gemini 2.0 Flash-Lite",
            1_048_576,
            ModelPricing::new(0.075, 0.30),
        ),
        CatalogEntry::new("gemini-2.5-flash", "Gemini 2.5 Flash", 1_048_576, ModelPricing::new(0.30, 2.50)),
        CatalogEntry::new("gemini-2.5-pro", "Gemini 2.5 Pro", 1_048_576, ModelPricing::new(1.25, 10.00))
            .describe("Prompts up to 200k tokens; longer prompts are billed higher"),
        CatalogEntry::new("gemini-1.5-flash", "Gemini 1.5 Flash", 1_048_576, ModelPricing::new(0.075, 0.30))
            .deprecated(),
        CatalogEntry::new("gemini-1.5-pro", "Gemini 1.5 Pro", 2_097_152, ModelPricing::new(1.25, 5.00))
            .deprecated(),
    ],
};

/// Gemini provider implementation
#[derive(Debug)]
pub struct GeminiProvider {
    client: HttpClient,
    api_key: SecretString,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
    /// Create a provider from its configuration. Requires an API key.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: client_for(config)?,
            api_key: config.require_api_key()?.clone(),
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            default_model: configured_model(config, &CATALOG),
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn catalog(&self) -> &'static ModelCatalog {
        &CATALOG
    }

    async fn send_message(&self, request: &LlmRequest) -> ProviderResult<LlmResponse> {
        let model = request.resolve_model(&self.default_model).to_string();
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let headers = json_headers([("x-goog-api-key", self.api_key.expose_secret())]);

        debug!(provider = "gemini", model = %model, "sending generateContent");
        let started = Instant::now();
        let body = self
            .client
            .post_json(&url, headers, &request_body(request))
            .await
            .map_err(|f| classify_failure(&f))?;

        let reply = parse_reply(body)?;
        Ok(finish_response(self, &model, reply, started))
    }
}

/// generateContent request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

fn request_body(request: &LlmRequest) -> GenerateRequest<'_> {
    let system_instruction = (!request.system_prompt.is_empty()).then(|| Content {
        role: None,
        parts: [Part {
            text: &request.system_prompt,
        }],
    });
    let temperature = clamp_temperature(request.temperature, 2.0);
    let generation_config = (request.max_tokens.is_some() || temperature.is_some()).then_some(
        GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature,
        },
    );

    GenerateRequest {
        contents: [Content {
            role: Some("user"),
            parts: [Part {
                text: &request.user_prompt,
            }],
        }],
        system_instruction,
        generation_config,
    }
}

fn parse_reply(body: Value) -> ProviderResult<ParsedReply> {
    let candidates = body
        .get("candidates")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = body
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            ProviderError::generic(
                ProviderKind::Gemini,
                format!("response has no candidates: {}", reason),
            )
        })?;

    let text = candidates
        .first()
        .and_then(|c| c.pointer("/content/parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if let Some(reason) = candidates
        .first()
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
    {
        if reason != "STOP" && reason != "MAX_TOKENS" {
            warn!(provider = "gemini", finish_reason = reason, "generation stopped early");
        }
    }

    let usage = TokenUsage::with_reported_total(
        counter(&body, "/usageMetadata/promptTokenCount"),
        counter(&body, "/usageMetadata/candidatesTokenCount"),
        body.pointer("/usageMetadata/totalTokenCount").and_then(Value::as_u64),
    );
    let model = body
        .get("modelVersion")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ParsedReply {
        text,
        usage,
        model,
        raw: body,
    })
}

/// Classify a failed `generateContent` call.
///
/// Gemini reports an invalid key as 400 `INVALID_ARGUMENT` with an
/// `API_KEY_INVALID` reason, so codes are checked before the status.
pub fn classify_failure(failure: &RawFailure) -> ProviderError {
    let provider = ProviderKind::Gemini;
    if let Some(details) = failure.details() {
        if details.code_is(&["UNAUTHENTICATED", "PERMISSION_DENIED", "API_KEY_INVALID"]) {
            return ProviderError::Authentication {
                provider,
                message: details.message,
            };
        }
        if details.code_is(&["RESOURCE_EXHAUSTED"]) {
            return ProviderError::RateLimited {
                provider,
                message: details.message,
                retry_after: failure.retry_after(),
            };
        }
    }
    classify_common(provider, failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(body: &GenerateRequest<'_>) -> Value {
        serde_json::to_value(body).unwrap()
    }

    #[test]
    fn test_request_body() {
        let request = LlmRequest::new("Be terse.", "Summarize").with_max_tokens(200).with_temperature(0.3);
        let body = wire(&request_body(&request));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Summarize");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 200);

        let request = LlmRequest::new("", "Summarize");
        let bare = wire(&request_body(&request));
        assert!(bare.get("systemInstruction").is_none());
        assert!(bare.get("generationConfig").is_none());
        assert_eq!(bare["contents"][0]["role"], "user");
    }

    #[test]
    fn test_temperature_keeps_its_decimal_form() {
        let request = LlmRequest::new("", "Summarize").with_temperature(0.3);
        let text = serde_json::to_string(&request_body(&request)).unwrap();
        assert!(text.contains(r#""generationConfig":{"temperature":0.3}"#), "{}", text);
    }

    #[test]
    fn test_parse_reply() {
        let reply = parse_reply(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 8, "candidatesTokenCount": 4, "totalTokenCount": 12 },
            "modelVersion": "gemini-2.0-flash-001"
        }))
        .unwrap();
        assert_eq!(reply.text, "{\"a\":1}");
        assert_eq!(reply.usage.total_tokens, 12);
        assert_eq!(reply.model.as_deref(), Some("gemini-2.0-flash-001"));
    }

    #[test]
    fn test_blocked_prompt() {
        let err = parse_reply(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_classify_invalid_key_on_400() {
        let failure = RawFailure::Status {
            status: 400,
            retry_after: None,
            body: r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#.to_string(),
        };
        assert!(matches!(
            classify_failure(&failure),
            ProviderError::Authentication { .. }
        ));
    }

    #[test]
    fn test_classify_resource_exhausted() {
        let failure = RawFailure::Status {
            status: 429,
            retry_after: None,
            body: r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#
                .to_string(),
        };
        assert_eq!(classify_failure(&failure).class(), "rate_limited");
    }

    #[test]
    fn test_flash_lite_not_priced_as_flash() {
        assert_eq!(
            CATALOG.pricing("gemini-2.0-flash-lite-001"),
            Some(ModelPricing::new(0.075, 0.30))
        );
        assert_eq!(
            CATALOG.pricing("gemini-2.0-flash-001"),
            Some(ModelPricing::new(0.10, 0.40))
        );
    }
}
