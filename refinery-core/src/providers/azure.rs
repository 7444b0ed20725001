//! Azure OpenAI provider implementation
//!
//! Same Chat Completions wire format as OpenAI, addressed by deployment:
//! `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=..`
//! with an `api-key` header. Configuration:
//!
//! - `base_url`: the resource endpoint (required)
//! - `extra.deployment`: deployment name (required)
//! - `extra.api_version`: defaults to [`DEFAULT_API_VERSION`]
//! - `default_model` or `extra.model`: the model behind the deployment,
//!   used for pricing; defaults to the deployment name

use crate::config::{ConfigError, ProviderConfig, SecretString, ValidationError};
use crate::http::{json_headers, HttpClient, RawFailure};
use crate::protocol::types::{LlmRequest, LlmResponse};
use crate::providers::adapter::{client_for, finish_response, Provider, ProviderKind};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::openai::{chat_body, classify_chat_failure, parse_chat_completion, OPENAI_MODELS};
use crate::providers::pricing::ModelCatalog;
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_API_VERSION: &str = "2024-06-01";

pub static CATALOG: ModelCatalog = ModelCatalog {
    default_model: "gpt-4o",
    entries: OPENAI_MODELS,
};

/// Azure OpenAI provider implementation
#[derive(Debug)]
pub struct AzureOpenAIProvider {
    client: HttpClient,
    api_key: SecretString,
    endpoint: String,
    deployment: String,
    api_version: String,
    model: String,
}

impl AzureOpenAIProvider {
    /// Create a provider from its configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?.clone();
        let endpoint = config
            .base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ValidationError::required("providers.azure.base_url"))?;
        let deployment = config
            .extra_str("deployment")
            .map(str::to_string)
            .ok_or_else(|| ValidationError::required("providers.azure.extra.deployment"))?;
        let api_version = config
            .extra_str("api_version")
            .unwrap_or(DEFAULT_API_VERSION)
            .to_string();
        let model = config
            .default_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| config.extra_str("model").map(str::to_string))
            .unwrap_or_else(|| deployment.clone());

        Ok(Self {
            client: client_for(config)?,
            api_key,
            endpoint,
            deployment,
            api_version,
            model,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl Provider for AzureOpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn catalog(&self) -> &'static ModelCatalog {
        &CATALOG
    }

    /// The deployment fixes the model; a model named on the request only
    /// changes which price is applied.
    async fn send_message(&self, request: &LlmRequest) -> ProviderResult<LlmResponse> {
        let model = request.resolve_model(&self.model).to_string();
        let headers = json_headers([("api-key", self.api_key.expose_secret())]);

        debug!(provider = "azure", deployment = %self.deployment, model = %model, "sending chat completion");
        let started = Instant::now();
        let body = self
            .client
            .post_json(&self.url(), headers, &chat_body(request, &model).for_deployment())
            .await
            .map_err(|f| classify_failure(&f))?;

        let reply = parse_chat_completion(ProviderKind::Azure, body)?;
        Ok(finish_response(self, &model, reply, started))
    }
}

/// Classify a failed deployment call
pub fn classify_failure(failure: &RawFailure) -> ProviderError {
    classify_chat_failure(ProviderKind::Azure, failure)
}
