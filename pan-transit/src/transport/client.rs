//! Pooled, rate-limited JSON client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

use super::error::TransportError;

/// Default maximum concurrent requests.
const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// How much of an unparseable body to keep for diagnostics.
const BODY_SNIPPET_CHARS: usize = 500;

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// User agent sent with every request
    pub user_agent: String,
    /// Maximum concurrent requests
    pub max_concurrent: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self {
            user_agent: concat!("pan-transit/", env!("CARGO_PKG_VERSION")).to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set maximum concurrent requests.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP client returning deserialized JSON.
///
/// Cheap to clone; clones share the connection pool and the concurrency
/// limit.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Ok(agent) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    /// GET `url` with query parameters and parse the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let _permit = self.permit().await?;
        debug!(url, "GET");
        let response = self.http.get(url).query(query).send().await?;
        parse_response(response).await
    }

    /// POST a text body to `url` and parse the JSON response.
    ///
    /// `headers` are added to the request as given; names or values that are
    /// not valid HTTP are skipped.
    pub async fn post_text_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let _permit = self.permit().await?;
        let mut header_map = HeaderMap::new();
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        for (name, value) in headers {
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes())
                && let Ok(value) = HeaderValue::from_str(value)
            {
                header_map.insert(name, value);
            }
        }
        debug!(url, "POST");
        let response = self.http.post(url).headers(header_map).body(body).send().await?;
        parse_response(response).await
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, TransportError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| TransportError::Status {
                status: 0,
                message: "Semaphore closed".to_string(),
            })
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| TransportError::Json {
        message: e.to_string(),
        body: Some(body.chars().take(BODY_SNIPPET_CHARS).collect()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = HttpClientConfig::new()
            .with_user_agent("test-agent")
            .with_max_concurrent(2)
            .with_timeout(5);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn default_user_agent_names_crate() {
        let config = HttpClientConfig::default();
        assert!(config.user_agent.starts_with("pan-transit/"));
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(HttpClient::new(HttpClientConfig::default()).is_ok());
    }
}
