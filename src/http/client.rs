//! HTTP client with rate limiting and status classification
//!
//! Each call makes exactly one attempt. Failures come back as typed errors
//! whose class tells the sync loop whether to back off and try again, so
//! retry bookkeeping stays in one place.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Fallback wait when a 429 carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Longest response body kept in error messages
const MAX_ERROR_BODY: usize = 1024;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers: HashMap::new(),
            user_agent: format!("batch-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Add an `Authorization: Bearer` header
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// HTTP client with rate limiting
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// POST a JSON body
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Response> {
        self.send(Method::POST, url, Some(body)).await
    }

    /// Make one request and classify the outcome
    ///
    /// 2xx responses are returned as-is. 429 becomes `RateLimited`, other
    /// statuses become `HttpStatus`, and a client-side timeout becomes
    /// `Timeout`.
    pub async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Response> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut req = self.client.request(method.clone(), url);
        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("Request timed out: {} {}", method, url);
                return Err(Error::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                });
            }
            Err(e) => return Err(Error::Http(e)),
        };

        let status = response.status();
        if status.is_success() {
            debug!("Request succeeded: {} {} -> {}", method, url, status.as_u16());
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = extract_retry_after(&response);
            warn!("Rate limited (429), server asks to wait {}s", retry_after);
            return Err(Error::RateLimited {
                retry_after_seconds: retry_after,
            });
        }

        let body = truncate_body(response.text().await.unwrap_or_default());
        warn!("Request failed: {} {} -> {}", method, url, status.as_u16());
        Err(Error::http_status(status.as_u16(), body))
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("timeout", &self.config.timeout)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Extract retry-after header value
fn extract_retry_after(response: &Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
