//! Configuration schema structures with serde support

use super::error::{ConfigError, ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::cost::currency::{Currency, CurrencyConverter};
use crate::providers::adapter::{Provider, ProviderKind};
use crate::providers::retry::{RetryExecutor, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Supported schema version
pub const CONFIG_VERSION: &str = "0.1";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RefineryConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Backend configurations, at most one per kind
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Retry policy applied around provider calls
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Cost reporting settings
    #[serde(default)]
    pub cost: CostConfig,
}

/// Configuration of one backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Which backend
    pub kind: ProviderKind,

    /// Whether this provider is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key (supports environment variable interpolation). Not used by
    /// local backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    /// Endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used when a request names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides `retry.max_retries` for this provider's calls; the
    /// top-level retry policy applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Provider-specific extension fields (Azure `deployment`,
    /// `api_version` and `model`, OpenAI `organization`)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

/// Cost reporting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Currency for estimates and summaries
    #[serde(default)]
    pub currency: Currency,

    /// Where the append-only ledger lives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,

    /// USD-relative rate overrides
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub rates: HashMap<Currency, f64>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Usd,
            ledger_path: None,
            rates: HashMap::new(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    /// An enabled configuration with defaults for everything but the kind
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            enabled: true,
            api_key: None,
            base_url: None,
            default_model: None,
            timeout_secs: default_timeout_secs(),
            max_retries: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// A string extension field
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The API key, or a validation error naming the missing field
    pub fn require_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ValidationError::required(format!("providers.{}.api_key", self.kind)).into())
    }

    /// Base URL override without a trailing slash, or `default`
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// Validate provider configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.timeout_secs", path),
                "Must be greater than 0",
            ));
        }

        if self.enabled && !self.kind.is_local() {
            let missing = self.api_key.as_ref().map(|k| k.is_empty()).unwrap_or(true);
            if missing {
                return Err(ValidationError::required(format!("{}.api_key", path))
                    .with_context(format!("{} requires an API key", self.kind)));
            }
        }

        if let Some(base_url) = &self.base_url {
            let field = format!("{}.base_url", path);
            let url = url::Url::parse(base_url)
                .map_err(|e| ValidationError::invalid_url(&field, e.to_string()))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ValidationError::invalid_url(
                    field,
                    format!("URL scheme must be http or https, got: {}", url.scheme()),
                ));
            }
        }

        if self.kind == ProviderKind::Azure && self.enabled {
            if self.base_url.is_none() {
                return Err(ValidationError::required(format!("{}.base_url", path))
                    .with_context("Azure OpenAI requires the resource endpoint"));
            }
            if self.extra_str("deployment").is_none() {
                return Err(ValidationError::required(format!("{}.extra.deployment", path)));
            }
        }

        Ok(())
    }
}

impl RefineryConfig {
    /// A configuration with no providers and default settings
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            providers: Vec::new(),
            retry: RetryPolicy::default(),
            cost: CostConfig::default(),
        }
    }

    /// Add a provider configuration
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// The configuration for `kind`, if present
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Instantiate every enabled provider
    pub fn build_providers(&self) -> Result<BTreeMap<ProviderKind, Arc<dyn Provider>>, ConfigError> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| Ok((p.kind, p.kind.create_provider(p)?)))
            .collect()
    }

    /// Retry executor for calls to `kind`: the top-level `retry` policy with
    /// that provider's `max_retries` override applied, if it sets one
    pub fn retry_executor(&self, kind: ProviderKind) -> RetryExecutor {
        let policy = match self.provider(kind) {
            Some(provider) => self.retry.for_provider(provider),
            None => self.retry.clone(),
        };
        RetryExecutor::new(policy)
    }

    /// Currency converter with this configuration's rate overrides
    pub fn currency_converter(&self) -> Result<CurrencyConverter, ConfigError> {
        Ok(CurrencyConverter::with_rates(self.cost.rates.clone())?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != CONFIG_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: CONFIG_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        let mut seen = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen.insert(provider.kind) {
                return Err(ValidationError::duplicate_provider(
                    format!("providers[{}].kind", i),
                    provider.kind,
                ));
            }
            provider.validate(&format!("providers[{}]", i))?;
        }

        self.retry.validate("retry")?;

        for (currency, rate) in &self.cost.rates {
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(ValidationError::out_of_range(
                    format!("cost.rates.{}", currency),
                    "Must be a positive number",
                ));
            }
        }

        Ok(())
    }
}

impl Default for RefineryConfig {
    fn default() -> Self {
        Self::new()
    }
}
