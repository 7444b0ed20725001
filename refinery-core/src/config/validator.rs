//! Configuration validation utilities

use super::env::env_var_pattern;
use super::error::{ValidationError, ValidationErrorKind};
use super::schema::RefineryConfig;
use crate::providers::adapter::ProviderKind;
use tracing::warn;

/// Configuration validator with rules that go beyond the schema checks
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &RefineryConfig) -> Result<(), ValidationError> {
        // First run the built-in validation
        config.validate()?;

        self.validate_enabled(config)?;
        self.validate_placeholders(config)?;
        self.check_default_models(config);

        Ok(())
    }

    /// At least one provider must be usable
    fn validate_enabled(&self, config: &RefineryConfig) -> Result<(), ValidationError> {
        if config.providers.iter().any(|p| p.enabled) {
            return Ok(());
        }
        Err(ValidationError::new(
            "providers",
            ValidationErrorKind::Incompatible {
                message: "At least one provider must be enabled".to_string(),
            },
        ))
    }

    /// Placeholders that survived interpolation mean the file was built by
    /// hand rather than loaded; reject them instead of sending them as keys
    fn validate_placeholders(&self, config: &RefineryConfig) -> Result<(), ValidationError> {
        for (i, provider) in config.providers.iter().enumerate() {
            if let Some(key) = &provider.api_key {
                if env_var_pattern().is_match(key.expose_secret()) {
                    return Err(ValidationError::invalid_value(
                        format!("providers[{}].api_key", i),
                        "resolved API key",
                        "unresolved ${...} placeholder",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Unknown default models are allowed (they are priced at the catalog
    /// default) but worth a warning
    fn check_default_models(&self, config: &RefineryConfig) {
        for provider in config.providers.iter().filter(|p| p.enabled) {
            if provider.kind == ProviderKind::Ollama {
                if provider.api_key.is_some() {
                    warn!(provider = %provider.kind, "api_key is ignored for local providers");
                }
                continue;
            }
            if let Some(model) = &provider.default_model {
                if crate::providers::catalog_for(provider.kind).entry(model).is_none() {
                    warn!(
                        provider = %provider.kind,
                        model = %model,
                        "default model has no pricing entry; the catalog default will be used for costs"
                    );
                }
            }
        }
    }
}
