// Service configuration.
// Loads TOML settings from the user config directory and applies environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};
use crate::github::ClientOptions;
use crate::github::client::{GITHUB_API_BASE, GITHUB_RAW_BASE};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GH_PROXY_CONFIG";

const DEFAULT_ORG: &str = "30osob-studio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Organization served by the data endpoints.
    pub org: String,
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub cache: CacheConfig,
    pub auto_refresh: AutoRefreshConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub api_base: String,
    pub raw_base: String,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_rate_limit_wait_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRefreshConfig {
    pub enabled: bool,
    /// Organizations refreshed at startup; empty means just `org`.
    pub orgs: Vec<String>,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            org: DEFAULT_ORG.to_string(),
            server: ServerConfig::default(),
            github: GitHubConfig::default(),
            cache: CacheConfig::default(),
            auto_refresh: AutoRefreshConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        let client = ClientOptions::default();
        Self {
            token: None,
            api_base: GITHUB_API_BASE.to_string(),
            raw_base: GITHUB_RAW_BASE.to_string(),
            user_agent: client.user_agent,
            max_retries: client.max_retries,
            retry_delay_ms: client.retry_delay.as_millis() as u64,
            max_rate_limit_wait_secs: client.max_rate_limit_wait.as_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

impl Default for AutoRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            orgs: Vec::new(),
            interval_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| ProxyError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply `HOST`, `PORT`, `API_TOKEN`/`GITHUB_TOKEN` and `GH_PROXY_ORG`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ProxyError::Config(format!("PORT is not a valid port: {}", port)))?;
        }
        if let Some(token) = lookup("API_TOKEN").or_else(|| lookup("GITHUB_TOKEN")) {
            self.github.token = Some(token);
        }
        if let Some(org) = lookup("GH_PROXY_ORG") {
            self.org = org;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.org.trim().is_empty() {
            return Err(ProxyError::Config("org must not be empty".to_string()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ProxyError::Config(
                "cache.ttl_secs must be positive".to_string(),
            ));
        }
        if self.auto_refresh.enabled && self.auto_refresh.interval_secs == 0 {
            return Err(ProxyError::Config(
                "auto_refresh.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh.interval_secs)
    }

    /// Organizations to auto-refresh at startup.
    pub fn refresh_orgs(&self) -> Vec<String> {
        if self.auto_refresh.orgs.is_empty() {
            vec![self.org.clone()]
        } else {
            self.auto_refresh.orgs.clone()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_base: self.github.api_base.clone(),
            raw_base: self.github.raw_base.clone(),
            user_agent: self.github.user_agent.clone(),
            token: self.github.token.clone(),
            max_retries: self.github.max_retries,
            retry_delay: Duration::from_millis(self.github.retry_delay_ms),
            max_rate_limit_wait: Duration::from_secs(self.github.max_rate_limit_wait_secs),
        }
    }
}

/// Config file location: `$GH_PROXY_CONFIG`, else `<config dir>/gh-proxy/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("", "", "gh-proxy").map(|dirs| dirs.config_dir().join("config.toml"))
}
