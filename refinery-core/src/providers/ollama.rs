//! Ollama provider implementation
//!
//! Self-hosted models over the local `/api/chat` endpoint. No credential,
//! no per-token billing: every call and every estimate costs zero.

use crate::config::{ConfigError, ProviderConfig};
use crate::http::{classify_common, json_headers, HttpClient, RawFailure};
use crate::protocol::types::{LlmRequest, LlmResponse, TokenUsage};
use crate::providers::adapter::{
    clamp_temperature, client_for, configured_model, counter, finish_response, CostModel,
    ParsedReply, Provider, ProviderKind,
};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::openai::{chat_messages, ChatMessage};
use crate::providers::pricing::{CatalogEntry, ModelCatalog, ModelPricing};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub static CATALOG: ModelCatalog = ModelCatalog {
    default_model: "llama3.2",
    entries: &[
        CatalogEntry::new("llama3.2", "Llama 3.2 3B", 131_072, ModelPricing::FREE),
        CatalogEntry::new("llama3.1", "Llama 3.1 8B", 131_072, ModelPricing::FREE),
        CatalogEntry::new("llama3.3", "Llama 3.3 70B", 131_072, ModelPricing::FREE)
            .describe("Needs a large GPU"),
        CatalogEntry::new("mistral", "Mistral 7B", 32_768, ModelPricing::FREE),
        CatalogEntry::new("qwen2.5", "Qwen 2.5 7B", 32_768, ModelPricing::FREE),
        CatalogEntry::new("gemma2", "Gemma 2 9B", 8_192, ModelPricing::FREE),
        CatalogEntry::new("phi3", "Phi-3 Mini", 128_000, ModelPricing::FREE),
        CatalogEntry::new("llama2", "Llama 2 7B", 4_096, ModelPricing::FREE).deprecated(),
    ],
};

/// A model present in the local Ollama store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Ollama provider implementation
#[derive(Debug)]
pub struct OllamaProvider {
    client: HttpClient,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    /// Create a provider from its configuration. An API key, if present,
    /// is ignored.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: client_for(config)?,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            default_model: configured_model(config, &CATALOG),
        })
    }

    /// Models installed on the Ollama host (`GET /api/tags`)
    pub async fn list_installed_models(&self) -> ProviderResult<Vec<InstalledModel>> {
        let body = self
            .client
            .get_json(&format!("{}/api/tags", self.base_url), json_headers([]))
            .await
            .map_err(|f| classify_failure(&f))?;

        let models = body.get("models").cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(models).map_err(|e| {
            ProviderError::generic(ProviderKind::Ollama, format!("invalid model list: {}", e))
        })
    }

    /// Download a model to the Ollama host (`POST /api/pull`).
    ///
    /// Blocks until the pull finishes and returns the final status.
    pub async fn pull_model(&self, name: &str) -> ProviderResult<String> {
        info!(provider = "ollama", model = name, "pulling model");
        let body = self
            .client
            .post_json(
                &format!("{}/api/pull", self.base_url),
                json_headers([]),
                &PullRequest { name, stream: false },
            )
            .await
            .map_err(|f| classify_failure(&f))?;

        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(ProviderError::generic(ProviderKind::Ollama, error));
        }
        Ok(body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("success")
            .to_string())
    }

    fn request_body<'a>(&self, request: &'a LlmRequest, model: &'a str) -> ChatRequest<'a> {
        let temperature = clamp_temperature(request.temperature, f32::MAX);
        ChatRequest {
            model,
            messages: chat_messages(request),
            stream: false,
            options: (request.max_tokens.is_some() || temperature.is_some()).then_some(
                ChatOptions {
                    num_predict: request.max_tokens,
                    temperature,
                },
            ),
        }
    }
}

/// `/api/chat` request body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[async_trait]
impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn catalog(&self) -> &'static ModelCatalog {
        &CATALOG
    }

    fn cost_model(&self) -> CostModel {
        CostModel::Local
    }

    async fn send_message(&self, request: &LlmRequest) -> ProviderResult<LlmResponse> {
        let model = request.resolve_model(&self.default_model).to_string();
        let url = format!("{}/api/chat", self.base_url);

        debug!(provider = "ollama", model = %model, "sending chat");
        let started = Instant::now();
        let body = self
            .client
            .post_json(&url, json_headers([]), &self.request_body(request, &model))
            .await
            .map_err(|f| classify_failure(&f))?;

        let reply = parse_reply(body)?;
        Ok(finish_response(self, &model, reply, started))
    }

    /// Listing installed models is cheaper than generating a token
    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get_json(&url, json_headers([])).await {
            Ok(_) => true,
            Err(failure) => {
                debug!(provider = "ollama", error = %failure.message(), "ollama not reachable");
                false
            }
        }
    }
}

fn parse_reply(body: Value) -> ProviderResult<ParsedReply> {
    let text = body
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::generic(ProviderKind::Ollama, "response has no message"))?
        .to_string();

    let usage = TokenUsage::new(
        counter(&body, "/prompt_eval_count"),
        counter(&body, "/eval_count"),
    );
    let model = body.get("model").and_then(Value::as_str).map(str::to_string);

    Ok(ParsedReply {
        text,
        usage,
        model,
        raw: body,
    })
}

/// Classify a failed Ollama call.
///
/// A refused connection means the daemon is not running (`Unavailable`);
/// a missing model is a 404 and stays a generic provider error.
pub fn classify_failure(failure: &RawFailure) -> ProviderError {
    classify_common(ProviderKind::Ollama, failure)
}
