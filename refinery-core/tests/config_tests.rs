//! Configuration loading tests

use refinery_core::config::{self, ConfigError, ValidationErrorKind};
use refinery_core::cost::{Currency, LedgerWriter};
use refinery_core::providers::ProviderKind;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_yaml_with_env_interpolation() {
    std::env::set_var("REFINERY_IT_ANTHROPIC_KEY", "sk-ant-from-env");
    std::env::set_var("REFINERY_IT_AZURE_KEY", "azure-from-env");

    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "refinery.yaml",
        r#"
version: "0.1"
providers:
  - kind: anthropic
    api_key: ${REFINERY_IT_ANTHROPIC_KEY}
    default_model: claude-3-5-haiku-20241022
    timeout_secs: 30
  - kind: azure
    api_key: ${REFINERY_IT_AZURE_KEY}
    base_url: https://my-resource.openai.azure.com
    extra:
      deployment: gpt-4o
      api_version: 2024-06-01
  - kind: ollama
    enabled: false
retry:
  max_retries: 4
  base_delay_ms: 250
cost:
  currency: EUR
  ledger_path: logs/cost_ledger.jsonl
  rates:
    EUR: 0.9
"#,
    );

    let config = config::load(&path).unwrap();
    let anthropic = config.provider(ProviderKind::Anthropic).unwrap();
    assert_eq!(anthropic.api_key.as_ref().unwrap().expose_secret(), "sk-ant-from-env");
    assert_eq!(anthropic.timeout_secs, 30);
    assert_eq!(config.retry.max_retries, 4);
    assert_eq!(config.retry.max_delay_ms, 60_000);
    assert_eq!(config.cost.currency, Currency::Eur);
    assert_eq!(
        config.currency_converter().unwrap().convert(1.0, Currency::Eur),
        0.9
    );
    assert!(LedgerWriter::from_config(&config.cost).is_some());

    let providers = config.build_providers().unwrap();
    assert_eq!(providers.len(), 2);
    assert!(providers.contains_key(&ProviderKind::Azure));
    assert!(!providers.contains_key(&ProviderKind::Ollama));
    assert_eq!(
        providers[&ProviderKind::Anthropic].default_model(),
        "claude-3-5-haiku-20241022"
    );

    std::env::remove_var("REFINERY_IT_ANTHROPIC_KEY");
    std::env::remove_var("REFINERY_IT_AZURE_KEY");
}

#[test]
fn test_provider_retry_override_wins() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "refinery.yaml",
        r#"
version: "0.1"
providers:
  - kind: ollama
    max_retries: 1
  - kind: gemini
    api_key: g-key
retry:
  max_retries: 4
  base_delay_ms: 250
"#,
    );
    let config = config::load(&path).unwrap();

    let ollama = config.retry_executor(ProviderKind::Ollama);
    assert_eq!(ollama.policy().max_retries, 1);
    assert_eq!(ollama.policy().base_delay_ms, 250);
    assert_eq!(config.retry_executor(ProviderKind::Gemini).policy().max_retries, 4);
    assert_eq!(config.retry_executor(ProviderKind::OpenAI).policy().max_retries, 4);
}

#[test]
fn test_load_json() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "refinery.json",
        r#"{ "version": "0.1", "providers": [{ "kind": "ollama" }] }"#,
    );
    let config = config::load(&path).unwrap();
    assert_eq!(config.providers.len(), 1);
    assert_eq!(config.cost.currency, Currency::Usd);
    assert_eq!(config.retry.max_retries, 3);
}

#[test]
fn test_missing_env_var() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "refinery.yaml",
        "version: \"0.1\"\nproviders:\n  - kind: openai\n    api_key: ${REFINERY_IT_NEVER_SET}\n",
    );
    match config::load_from_yaml(&path) {
        Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "REFINERY_IT_NEVER_SET"),
        other => panic!("expected EnvVarNotFound, got {:?}", other),
    }
}

#[test]
fn test_cloud_provider_requires_key() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "refinery.yaml",
        "version: \"0.1\"\nproviders:\n  - kind: gemini\n",
    );
    match config::load(&path) {
        Err(ConfigError::ValidationError(e)) => {
            assert_eq!(e.field_path, "providers[0].api_key");
            assert!(matches!(e.kind, ValidationErrorKind::RequiredFieldMissing));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_provider_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "refinery.yaml",
        "version: \"0.1\"\nproviders:\n  - kind: ollama\n  - kind: ollama\n",
    );
    match config::load(&path) {
        Err(ConfigError::ValidationError(e)) => {
            assert_eq!(e.field_path, "providers[1].kind");
            assert!(matches!(e.kind, ValidationErrorKind::DuplicateValue { .. }));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_unknown_fields_and_currencies_are_parse_errors() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "typo.yaml",
        "version: \"0.1\"\nproviders:\n  - kind: ollama\nretry:\n  max_retry: 3\n",
    );
    assert!(matches!(config::load(&path), Err(ConfigError::ParseError { .. })));

    let path = write(
        &dir,
        "currency.yaml",
        "version: \"0.1\"\nproviders:\n  - kind: ollama\ncost:\n  currency: CHF\n",
    );
    assert!(matches!(config::load(&path), Err(ConfigError::ParseError { .. })));
}

#[test]
fn test_bad_retry_policy() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "refinery.yaml",
        "version: \"0.1\"\nproviders:\n  - kind: ollama\nretry:\n  base_delay_ms: 5000\n  max_delay_ms: 100\n",
    );
    match config::load(&path) {
        Err(ConfigError::ValidationError(e)) => assert_eq!(e.field_path, "retry.max_delay_ms"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        config::load("/nonexistent/refinery.yaml"),
        Err(ConfigError::IoError { .. })
    ));
}
