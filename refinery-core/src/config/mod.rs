//! Configuration module
//!
//! Typed provider, retry and cost settings, loaded from YAML or JSON with
//! `${VAR}` environment interpolation and validated before use.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::interpolate_env_vars;
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{CostConfig, ProviderConfig, RefineryConfig, CONFIG_VERSION};
pub use secrets::SecretString;
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<RefineryConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;
    let interpolated = env::interpolate_env_vars(&content)?;

    let config: RefineryConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<RefineryConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;
    let interpolated = env::interpolate_env_vars(&content)?;

    let config: RefineryConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Load a configuration, choosing the format from the file extension
pub fn load<P: AsRef<Path>>(path: P) -> Result<RefineryConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_from_json(path),
        Some("yaml") | Some("yml") => load_from_yaml(path),
        other => Err(ConfigError::UnsupportedFormat {
            path: path.to_string_lossy().to_string(),
            extension: other.unwrap_or("").to_string(),
        }),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = r#"
version: "0.1"
providers:
  - kind: anthropic
    api_key: sk-ant-test
    default_model: claude-3-5-haiku-20241022
  - kind: ollama
    base_url: http://localhost:11434
retry:
  max_retries: 2
  base_delay_ms: 500
cost:
  currency: EUR
"#;
        let config: Result<RefineryConfig, _> = serde_yaml::from_str(yaml);
        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.retry.max_retries, 2);
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            load("refinery.toml"),
            Err(ConfigError::UnsupportedFormat { extension, .. }) if extension == "toml"
        ));
    }
}
