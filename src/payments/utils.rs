use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// Credentials attached to a gateway request.
#[derive(Clone, Copy)]
pub enum HttpAuth<'a> {
    Basic { username: &'a str, password: &'a str },
}

/// Thin JSON client shared by gateway adapters.
///
/// Every call is a single attempt bounded by `timeout`; retry policy belongs
/// to the caller (the payment monitor re-polls on its own schedule and
/// payment creation is never retried).
#[derive(Clone)]
pub struct PaymentHttpClient {
    provider: &'static str,
    client: Client,
    timeout: Duration,
}

impl PaymentHttpClient {
    pub fn new(provider: &'static str, timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            provider,
            client,
            timeout,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        auth: Option<HttpAuth<'_>>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> PaymentResult<T> {
        let timeout = timeout.unwrap_or(self.timeout);
        let mut request = self.client.request(method.clone(), url).timeout(timeout);

        if let Some(HttpAuth::Basic { username, password }) = auth {
            request = request.basic_auth(username, Some(password));
        }
        for (k, v) in additional_headers {
            request = request.header(*k, *v);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        debug!(provider = self.provider, method = %method, url = url, "gateway request");

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::TimeoutError {
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                PaymentError::NetworkError {
                    message: format!("provider request failed: {}", e),
                }
            }
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| PaymentError::NetworkError {
            message: format!("failed to read provider response: {}", e),
        })?;

        if status.is_success() {
            return serde_json::from_str::<T>(&text).map_err(|e| PaymentError::ProviderError {
                provider: self.provider.to_string(),
                message: format!("invalid provider JSON response: {}", e),
                provider_code: None,
                retryable: false,
            });
        }

        if status.as_u16() == 429 {
            return Err(PaymentError::RateLimitError {
                message: "provider rate limit exceeded".to_string(),
                retry_after_seconds: None,
            });
        }

        warn!(provider = self.provider, status = %status, "gateway returned an error status");

        Err(PaymentError::ProviderError {
            provider: self.provider.to_string(),
            message: describe_error_body(&text).unwrap_or_else(|| format!("HTTP {}", status)),
            provider_code: Some(status.as_u16().to_string()),
            retryable: status.is_server_error(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    description: Option<String>,
}

/// Pull a readable reason out of a gateway error body, if it has one.
pub fn describe_error_body(text: &str) -> Option<String> {
    let body: ErrorBody = serde_json::from_str(text).ok()?;
    match (body.description, body.code) {
        (Some(description), Some(code)) => Some(format!("{} ({})", description, code)),
        (Some(description), None) => Some(description),
        (None, Some(code)) => Some(code),
        (None, None) => None,
    }
}
