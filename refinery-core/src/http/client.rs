//! HTTP client implementation using reqwest

use crate::http::error::{parse_retry_after, RawFailure};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Maximum response size (10MB)
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Default user agent
const USER_AGENT: &str = concat!("refinery/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP client shared by one adapter.
///
/// Cloning is cheap; the underlying reqwest client pools connections.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    max_response_size: usize,
}

impl HttpClient {
    /// Create a client whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_config(Duration::from_secs(10).min(timeout), timeout)
    }

    /// Create a client with explicit connect and request timeouts
    pub fn with_config(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// POST a JSON body and decode a JSON response
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<Value, RawFailure> {
        self.execute(self.client.post(url).headers(headers).json(body), url)
            .await
    }

    /// GET a JSON response
    pub async fn get_json(&self, url: &str, headers: HeaderMap) -> Result<Value, RawFailure> {
        self.execute(self.client.get(url).headers(headers), url).await
    }

    async fn execute(&self, builder: RequestBuilder, url: &str) -> Result<Value, RawFailure> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, url = redact_query(url), "sending request");

        let response = builder
            .header("X-Request-ID", request_id.to_string())
            .send()
            .await
            .map_err(|e| {
                let failure = RawFailure::from_reqwest(&e);
                warn!(%request_id, error = %e, "request failed before a response");
                failure
            })?;

        let status = response.status();
        debug!(%request_id, status = status.as_u16(), "response received");

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            warn!(%request_id, status = status.as_u16(), "request failed with status");
            return Err(RawFailure::Status {
                status: status.as_u16(),
                retry_after,
                body,
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_response_size {
                return Err(RawFailure::Decode(format!(
                    "Response size {} exceeds maximum {} [request_id: {}]",
                    len, self.max_response_size, request_id
                )));
            }
        }

        let text = response
            .text()
            .await
            .map_err(|e| RawFailure::from_reqwest(&e))?;

        if text.len() > self.max_response_size {
            return Err(RawFailure::Decode(format!(
                "Response size {} exceeds maximum {} [request_id: {}]",
                text.len(),
                self.max_response_size,
                request_id
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            RawFailure::Decode(format!(
                "Invalid response format: {} [request_id: {}]",
                e, request_id
            ))
        })
    }
}

/// Build a header map from name/value pairs.
///
/// Values that are not valid header values are skipped.
pub fn json_headers<'a, I>(pairs: I) -> HeaderMap
where
    I: IntoIterator<Item = (&'static str, &'a str)>,
{
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in pairs {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(header), Ok(mut v)) => {
                if header == AUTHORIZATION || header.as_str().contains("key") {
                    v.set_sensitive(true);
                }
                headers.insert(header, v);
            }
            _ => warn!(header = name, "skipping invalid header"),
        }
    }
    headers
}

/// Drop the query string so keys passed as parameters never reach the logs
fn redact_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_headers() {
        let headers = json_headers([("x-api-key", "secret"), ("anthropic-version", "2023-06-01")]);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-api-key"], "secret");
        assert!(headers["x-api-key"].is_sensitive());
        assert!(!headers["anthropic-version"].is_sensitive());
    }

    #[test]
    fn test_invalid_header_skipped() {
        let headers = json_headers([("x-api-key", "bad\nvalue")]);
        assert!(headers.get("x-api-key").is_none());
    }

    #[test]
    fn test_redact_query() {
        assert_eq!(redact_query("https://h/p?key=abc"), "https://h/p");
        assert_eq!(redact_query("https://h/p"), "https://h/p");
    }
}
