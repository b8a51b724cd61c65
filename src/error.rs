// Error types for the proxy.
// Covers GitHub API failures, cache/scheduler argument errors, and configuration problems.

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("GitHub API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("No admin members found for organization {0}")]
    NoAdmin(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A fetch for a cache key failed. The source is shared because every
    /// caller waiting on the same in-flight fetch receives the same failure.
    #[error("Upstream fetch failed for {key}: {source}")]
    Upstream {
        key: String,
        #[source]
        source: Arc<ProxyError>,
    },

    #[error("{0}")]
    Other(String),
}

impl ProxyError {
    /// Whether this error came from GitHub rather than from the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ProxyError::Api(_)
                | ProxyError::Unauthorized
                | ProxyError::NotFound(_)
                | ProxyError::RateLimited { .. }
                | ProxyError::NoAdmin(_)
                | ProxyError::Upstream { .. }
        )
    }

    /// Whether retrying the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProxyError::Unauthorized | ProxyError::NotFound(_) | ProxyError::NoAdmin(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
