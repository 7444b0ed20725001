//! Tests for the retry policy and executor

use async_trait::async_trait;
use proptest::prelude::*;
use refinery_core::protocol::{Cost, LlmRequest, LlmResponse, TokenUsage};
use refinery_core::providers::{
    ollama, ModelCatalog, Provider, ProviderError, ProviderKind, ProviderResult, RetryExecutor,
    RetryPolicy,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Provider that replays a fixed script of outcomes
struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderResult<LlmResponse>>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(script: Vec<ProviderResult<LlmResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn default_model(&self) -> &str {
        "llama3.2"
    }

    fn catalog(&self) -> &'static ModelCatalog {
        &ollama::CATALOG
    }

    async fn send_message(&self, _request: &LlmRequest) -> ProviderResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable()))
    }
}

fn ok() -> ProviderResult<LlmResponse> {
    Ok(LlmResponse {
        text: "done".to_string(),
        usage: TokenUsage::new(1, 1),
        provider: ProviderKind::Ollama,
        model: "llama3.2".to_string(),
        cost: Cost::zero(),
        duration: Duration::from_millis(1),
        raw: Value::Null,
    })
}

fn rate_limited() -> ProviderError {
    ProviderError::RateLimited {
        provider: ProviderKind::Ollama,
        message: "slow down".to_string(),
        retry_after: Some(Duration::from_secs(30)),
    }
}

fn unavailable() -> ProviderError {
    ProviderError::Unavailable {
        provider: ProviderKind::Ollama,
        message: "connection refused".to_string(),
    }
}

fn auth() -> ProviderError {
    ProviderError::Authentication {
        provider: ProviderKind::Ollama,
        message: "bad key".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_rate_limits_then_success() {
    let provider = ScriptedProvider::new(vec![Err(rate_limited()), Err(rate_limited()), ok()]);
    let executor = RetryExecutor::new(RetryPolicy::new(3));
    let request = LlmRequest::new("", "hi");

    let started = tokio::time::Instant::now();
    let outcome = executor.execute(|| provider.send_message(&request)).await;

    assert_eq!(outcome.attempts(), 3);
    // 1000ms + 2000ms; the backend's 30s hint is ignored by default
    assert_eq!(outcome.total_delay(), Duration::from_millis(3_000));
    assert_eq!(started.elapsed(), Duration::from_millis(3_000));
    assert_eq!(outcome.error_history().len(), 2);
    assert!(outcome.is_success());
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_authentication_is_never_retried() {
    let provider = ScriptedProvider::new(vec![Err(auth()), ok()]);
    let executor = RetryExecutor::new(RetryPolicy::new(5));
    let request = LlmRequest::new("", "hi");

    let err = executor.execute_request(&provider, &request).await.unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(err.source, auth());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_generic_provider_error_is_not_retried() {
    let generic = ProviderError::Provider {
        provider: ProviderKind::Ollama,
        status: Some(500),
        message: "internal".to_string(),
    };
    let provider = ScriptedProvider::new(vec![Err(generic.clone()), ok()]);
    let executor = RetryExecutor::default();

    let err = executor
        .execute_request(&provider, &LlmRequest::new("", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.into_inner(), generic);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_surfaces_last_error_verbatim() {
    let provider = ScriptedProvider::new(vec![
        Err(rate_limited()),
        Err(rate_limited()),
        Err(rate_limited()),
        Err(unavailable()),
    ]);
    let executor = RetryExecutor::new(RetryPolicy::new(3));
    let request = LlmRequest::new("", "hi");

    let outcome = executor.execute(|| provider.send_message(&request)).await;
    assert_eq!(outcome.attempts(), 4);
    assert_eq!(outcome.total_delay(), Duration::from_millis(7_000));
    let history = outcome.error_history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0], &rate_limited());
    assert_eq!(history[3], &unavailable());

    let err = outcome.into_result().unwrap_err();
    assert_eq!(err.attempts, 4);
    assert_eq!(err.source, unavailable());
    assert!(err.to_string().ends_with("(after 4 attempts)"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_honored_when_enabled() {
    let provider = ScriptedProvider::new(vec![Err(rate_limited()), ok()]);
    let policy = RetryPolicy {
        respect_retry_after: true,
        ..RetryPolicy::default()
    };
    let request = LlmRequest::new("", "hi");
    let outcome = RetryExecutor::new(policy)
        .execute(|| provider.send_message(&request))
        .await;
    assert_eq!(outcome.total_delay(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_policy() {
    let provider = ScriptedProvider::new(vec![Err(unavailable()), ok()]);
    let request = LlmRequest::new("", "hi");
    let outcome = RetryExecutor::new(RetryPolicy::no_retry())
        .execute(|| provider.send_message(&request))
        .await;
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.total_delay(), Duration::ZERO);
    assert!(!outcome.is_success());
    assert_eq!(outcome.error_history(), vec![&unavailable()]);
    assert_eq!(outcome.into_result().unwrap_err().attempts, 1);
}

#[test]
fn test_presets() {
    assert_eq!(RetryPolicy::conservative().max_retries, 2);
    assert_eq!(RetryPolicy::aggressive().max_retries, 5);
    assert!(RetryPolicy::conservative().validate("retry").is_ok());
    assert!(RetryPolicy::aggressive().validate("retry").is_ok());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Always-failing retryable call: exactly max_retries + 1 attempts
    #[test]
    fn prop_attempts_bounded(max_retries in 0u32..6) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let outcome = runtime.block_on(async {
            RetryExecutor::new(RetryPolicy::new(max_retries))
                .execute(|| async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(unavailable())
                })
                .await
        });

        prop_assert_eq!(outcome.attempts(), max_retries + 1);
        prop_assert_eq!(counter.load(Ordering::SeqCst), max_retries + 1);
        // sum of base * 2^(k-1) for k in 1..=max_retries
        let expected = 1_000u64 * ((1u64 << max_retries) - 1);
        prop_assert_eq!(outcome.total_delay(), Duration::from_millis(expected));
    }

    #[test]
    fn prop_delay_is_capped(retry in 1u32..40, base in 1u64..5_000, cap in 5_000u64..120_000) {
        let policy = RetryPolicy {
            base_delay_ms: base,
            max_delay_ms: cap,
            ..RetryPolicy::default()
        };
        let delay = policy.calculate_delay(retry, &unavailable());
        prop_assert!(delay <= Duration::from_millis(cap));
        let uncapped = (base as f64) * 2f64.powi(retry as i32 - 1);
        if uncapped <= cap as f64 {
            prop_assert_eq!(delay, Duration::from_millis(uncapped as u64));
        }
    }
}
