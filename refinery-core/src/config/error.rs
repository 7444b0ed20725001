//! Configuration and provider-setup errors

use crate::cost::currency::CurrencyError;
use crate::providers::adapter::ProviderKind;
use std::fmt;
use thiserror::Error;

/// Failure to load a configuration or to build providers from it
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config from '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in '{path}' at line {}, column {}: {message}",
            .line.unwrap_or(0), .column.unwrap_or(0))]
    ParseError {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error("Unsupported config format '{extension}' for '{path}' (expected .yaml, .yml or .json)")]
    UnsupportedFormat { path: String, extension: String },

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Environment variable '{var}' not found")]
    EnvVarNotFound { var: String },

    #[error("Cannot set up {provider} provider: {message}")]
    ProviderSetup {
        provider: ProviderKind,
        message: String,
    },

    #[error("Invalid exchange rates: {0}")]
    Currency(#[from] CurrencyError),
}

/// A rejected configuration value and where it lives
#[derive(Debug, Error)]
pub struct ValidationError {
    /// e.g. `providers[0].api_key`
    pub field_path: String,
    pub kind: ValidationErrorKind,
    pub context: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed at '{}': {}", self.field_path, self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ValidationErrorKind {
    #[error("required field is missing")]
    RequiredFieldMissing,

    #[error("invalid value: expected {expected}, got {actual}")]
    InvalidValue { expected: String, actual: String },

    #[error("value out of range: {message}")]
    OutOfRange { message: String },

    #[error("duplicate value: {value}")]
    DuplicateValue { value: String },

    #[error("incompatible configuration: {message}")]
    Incompatible { message: String },

    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("invalid version: expected {expected}, got {actual}")]
    InvalidVersion { expected: String, actual: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn required(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::RequiredFieldMissing)
    }

    pub fn invalid_value(
        field_path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::InvalidValue {
                expected: expected.into(),
                actual: actual.into(),
            },
        )
    }

    pub fn out_of_range(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::OutOfRange {
                message: message.into(),
            },
        )
    }

    /// Second provider entry of the same kind
    pub fn duplicate_provider(field_path: impl Into<String>, kind: ProviderKind) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::DuplicateValue {
                value: kind.to_string(),
            },
        )
        .with_context("each provider kind may be configured once")
    }

    pub fn invalid_url(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::InvalidUrl {
                message: message.into(),
            },
        )
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::required("providers[0].api_key").with_context("openai requires an API key");
        assert_eq!(
            err.to_string(),
            "Validation failed at 'providers[0].api_key': required field is missing (openai requires an API key)"
        );
    }

    #[test]
    fn test_config_error_wraps_validation() {
        let err: ConfigError = ValidationError::out_of_range("retry.base_delay_ms", "Must be greater than 0").into();
        assert!(err.to_string().starts_with("Validation error: "));
    }

    #[test]
    fn test_duplicate_provider_names_kind() {
        let err = ValidationError::duplicate_provider("providers[1].kind", ProviderKind::Gemini);
        assert!(matches!(&err.kind, ValidationErrorKind::DuplicateValue { value } if value == "gemini"));
        assert!(err.to_string().contains("configured once"));
    }

    #[test]
    fn test_currency_error_converts() {
        let err: ConfigError = CurrencyError::Unsupported("CHF".to_string()).into();
        assert_eq!(err.to_string(), "Invalid exchange rates: Unsupported currency: CHF");
    }

    #[test]
    fn test_provider_setup_message() {
        let err = ConfigError::ProviderSetup {
            provider: ProviderKind::Ollama,
            message: "no TLS backend".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot set up ollama provider: no TLS backend");
    }
}
