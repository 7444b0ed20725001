//! HTTP error mapping utilities
//!
//! [`RawFailure`] is the unclassified failure of one HTTP exchange. Adapters
//! turn it into a [`ProviderError`] with their own `classify_failure`
//! function, usually by checking backend error codes first and deferring to
//! [`classify_common`] for everything else.

use crate::providers::adapter::ProviderKind;
use crate::providers::error::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::io::ErrorKind;
use std::time::Duration;

/// An HTTP exchange that did not produce a usable JSON body
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// The request did not complete within the client timeout
    Timeout(String),

    /// DNS failure, connection refused, or the connection dropped before
    /// the response was complete
    Connect(String),

    /// Any other transport-level failure
    Transport(String),

    /// The backend answered with a non-success status
    Status {
        status: u16,
        retry_after: Option<Duration>,
        body: String,
    },

    /// A success status whose body could not be decoded
    Decode(String),
}

impl RawFailure {
    /// Build from a reqwest error raised while sending or reading.
    ///
    /// A connection lost mid-exchange surfaces from reqwest as a request,
    /// body or decode error; all of these are reported as `Connect`. Only a
    /// body that arrived whole but cannot be decoded is `Decode`.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            RawFailure::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() || connection_lost(err) {
            RawFailure::Connect(err.to_string())
        } else if err.is_decode() {
            RawFailure::Decode(err.to_string())
        } else {
            RawFailure::Transport(err.to_string())
        }
    }

    /// HTTP status, if the backend answered
    pub fn status(&self) -> Option<u16> {
        match self {
            RawFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Structured error details parsed from the response body
    pub fn details(&self) -> Option<ErrorDetails> {
        match self {
            RawFailure::Status { body, .. } => serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| extract_error_details(&v)),
            _ => None,
        }
    }

    /// Best human-readable message for this failure
    pub fn message(&self) -> String {
        match self {
            RawFailure::Timeout(m)
            | RawFailure::Connect(m)
            | RawFailure::Transport(m)
            | RawFailure::Decode(m) => m.clone(),
            RawFailure::Status { status, body, .. } => self
                .details()
                .map(|d| d.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        format!("HTTP error {}", status)
                    } else {
                        truncate(body, 500)
                    }
                }),
        }
    }

    /// Retry hint from the `Retry-After` header or a `retry_after` body field
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RawFailure::Status { retry_after, .. } => retry_after.or_else(|| {
                self.details()
                    .and_then(|d| d.retry_after_seconds)
                    .map(Duration::from_secs)
            }),
            _ => None,
        }
    }
}

/// Whether an I/O error anywhere in the source chain means the peer went away
fn connection_lost(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if is_connection_loss(io.kind()) {
                return true;
            }
        }
        source = current.source();
    }
    false
}

fn is_connection_loss(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

/// Error details extracted from a JSON error body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorDetails {
    pub message: String,
    /// Backend error codes and types (`rate_limit_error`, `invalid_api_key`,
    /// `RESOURCE_EXHAUSTED`, ...)
    pub codes: Vec<String>,
    pub retry_after_seconds: Option<u64>,
}

impl ErrorDetails {
    /// Whether any reported code equals one of `codes`
    pub fn code_is(&self, codes: &[&str]) -> bool {
        self.codes
            .iter()
            .any(|c| codes.iter().any(|k| c.eq_ignore_ascii_case(k)))
    }
}

/// Extract error details from common JSON error envelopes
fn extract_error_details(json: &Value) -> Option<ErrorDetails> {
    // { "error": { "message": "...", "type"|"code"|"status": "..." } }
    if let Some(error) = json.get("error").filter(|e| e.is_object()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // Numeric codes only repeat the HTTP status, so only strings count
        let mut codes: Vec<String> = ["type", "code", "status"]
            .iter()
            .filter_map(|k| error.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        // Gemini reports the specific reason in details[].reason
        if let Some(details) = error.get("details").and_then(Value::as_array) {
            codes.extend(
                details
                    .iter()
                    .filter_map(|d| d.get("reason").and_then(Value::as_str))
                    .map(str::to_string),
            );
        }
        return Some(ErrorDetails {
            message,
            codes,
            retry_after_seconds: error.get("retry_after").and_then(Value::as_u64),
        });
    }

    // { "error": "..." } as Ollama reports it
    if let Some(error) = json.get("error").and_then(Value::as_str) {
        return Some(ErrorDetails {
            message: error.to_string(),
            codes: Vec::new(),
            retry_after_seconds: json.get("retry_after").and_then(Value::as_u64),
        });
    }

    if let Some(message) = json.get("message").and_then(Value::as_str) {
        return Some(ErrorDetails {
            message: message.to_string(),
            codes: json
                .get("code")
                .and_then(Value::as_str)
                .map(|c| vec![c.to_string()])
                .unwrap_or_default(),
            retry_after_seconds: json.get("retry_after").and_then(Value::as_u64),
        });
    }

    None
}

/// Classification shared by all adapters.
///
/// Timeouts and connection failures are `Unavailable`; 401/403 are
/// `Authentication`; 429 is `RateLimited`; 408/504 are `Unavailable`;
/// everything else is a generic `Provider` error.
pub fn classify_common(provider: ProviderKind, failure: &RawFailure) -> ProviderError {
    let message = failure.message();
    match failure {
        RawFailure::Timeout(_) | RawFailure::Connect(_) => {
            ProviderError::Unavailable { provider, message }
        }
        RawFailure::Transport(_) | RawFailure::Decode(_) => ProviderError::Provider {
            provider,
            status: None,
            message,
        },
        RawFailure::Status { status, .. } => match status {
            401 | 403 => ProviderError::Authentication { provider, message },
            429 => ProviderError::RateLimited {
                provider,
                message,
                retry_after: failure.retry_after(),
            },
            408 | 504 => ProviderError::Unavailable { provider, message },
            _ => ProviderError::Provider {
                provider,
                status: Some(*status),
                message,
            },
        },
    }
}

/// Parse a `Retry-After` header value given in seconds
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
