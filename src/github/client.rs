// GitHub API HTTP client.
// Handles authentication, rate limit tracking, retry with backoff, and raw content downloads.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ProxyError, Result};

use super::types::RateLimit;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_RAW_BASE: &str = "https://raw.githubusercontent.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Wait used when a rate-limited response carries no `Retry-After` header.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Connection and retry settings for [`GitHubClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base: String,
    pub raw_base: String,
    pub user_agent: String,
    pub token: Option<String>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `n * retry_delay`.
    pub retry_delay: Duration,
    /// Upper bound on a single rate-limit wait.
    pub max_rate_limit_wait: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: GITHUB_API_BASE.to_string(),
            raw_base: GITHUB_RAW_BASE.to_string(),
            user_agent: concat!("gh-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
            token: None,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

/// GitHub API client with authentication and rate limit tracking.
///
/// Methods take `&self` so one client can serve concurrent fetches.
pub struct GitHubClient {
    client: Client,
    options: ClientOptions,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a new GitHub client from the given options.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();

        match options.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ProxyError::Config(e.to_string()))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            None => warn!("No GitHub token configured, using anonymous rate limits"),
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .map_err(|e| ProxyError::Config(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ProxyError::Api)?;

        Ok(Self {
            client,
            options: ClientOptions {
                api_base: options.api_base.trim_end_matches('/').to_string(),
                raw_base: options.raw_base.trim_end_matches('/').to_string(),
                ..options
            },
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Get the current rate limit information.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit.lock().clone()
    }

    /// GET an API endpoint and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.get_json_with_params(endpoint, &[]).await
    }

    /// GET an API endpoint with query parameters and decode the JSON body.
    pub async fn get_json_with_params<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.options.api_base, endpoint);
        let response = self.send(&url, params).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Download a file from raw.githubusercontent.com.
    /// Missing files and transport failures both yield `None`.
    pub async fn get_raw_text(&self, path: &str) -> Option<String> {
        let url = format!("{}/{}", self.options.raw_base, path.trim_start_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                debug!(url, status = %response.status(), "Raw content not available");
                None
            }
            Err(e) => {
                debug!(url, error = %e, "Raw content request failed");
                None
            }
        }
    }

    /// Send a GET, retrying transient failures with linear backoff.
    async fn send(&self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            let (error, wait) = match self.client.get(url).query(params).send().await {
                Ok(response) => {
                    self.update_rate_limit(&response);
                    let wait = self.rate_limit_wait(&response);
                    match self.check_response(response).await {
                        Ok(response) => return Ok(response),
                        Err(e) => (e, wait),
                    }
                }
                Err(e) => (ProxyError::Api(e), None),
            };

            if !error.is_retryable() || attempt >= self.options.max_retries {
                return Err(error);
            }

            attempt += 1;
            let delay = wait.unwrap_or(self.options.retry_delay * attempt);
            warn!(
                url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "GitHub request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let mut rate_limit = self.rate_limit.lock();

        if let Some(limit) = header_u64(response, "x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header_u64(response, "x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header_u64(response, "x-ratelimit-reset") {
            rate_limit.reset = reset;
        }
    }

    /// How long to wait before retrying a rate-limited response, if it is one.
    fn rate_limit_wait(&self, response: &Response) -> Option<Duration> {
        if !is_rate_limited(response) {
            return None;
        }

        let wait = header_u64(response, RETRY_AFTER.as_str())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
        Some(wait.min(self.options.max_rate_limit_wait))
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        if is_rate_limited(&response) {
            let reset = self.rate_limit.lock().reset;
            let reset_at = chrono::DateTime::from_timestamp(reset as i64, 0)
                .map(|dt| dt.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(ProxyError::RateLimited { reset_at });
        }

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ProxyError::Unauthorized),
            StatusCode::NOT_FOUND => {
                let url = response.url().to_string();
                Err(ProxyError::NotFound(url))
            }
            status => Err(ProxyError::Other(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}

/// 429, or 403 with the remaining quota exhausted.
fn is_rate_limited(response: &Response) -> bool {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => header_u64(response, "x-ratelimit-remaining") == Some(0),
        _ => false,
    }
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
