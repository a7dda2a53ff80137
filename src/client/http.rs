//! HTTP Client
//!
//! Single-shot JSON POST against an OpenAI-compatible endpoint. Retries are the
//! gateway's job, so every failure is returned immediately, classified.

use crate::api::CompletionResponse;
use crate::client::classify::{classify_status, classify_transport};
use crate::error::{ClassifiedError, GatewayError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Shared connection pool for all providers
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// POST `body` and decode a completion response
    pub async fn post_completion(
        &self,
        url: &str,
        body: &serde_json::Value,
        api_key: Option<&str>,
        extra_headers: &HeaderMap,
        timeout: Option<Duration>,
    ) -> std::result::Result<CompletionResponse, ClassifiedError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| ClassifiedError::Auth("API key is not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in extra_headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut request = self.client.post(url).headers(headers).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            debug!(url, status = status.as_u16(), "provider returned error status");
            return Err(classify_status(status, &response_headers, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            ClassifiedError::Unavailable(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                text.chars().take(200).collect::<String>()
            ))
        })
    }
}

/// Build a header map from configured pairs, skipping invalid entries
pub fn header_map(pairs: &std::collections::HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in pairs {
        if let (Ok(name), Ok(val)) = (
            reqwest::header::HeaderName::try_from(key.as_str()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, val);
        }
    }
    headers
}
