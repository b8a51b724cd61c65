// GitHub API response types.
// Defines structs for deserializing the GitHub REST API responses the proxy aggregates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner type discriminator (user or organization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OwnerType {
    #[default]
    User,
    Organization,
    Bot,
    #[serde(other)]
    Unknown,
}

/// GitHub organization profile (`/orgs/{org}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub login: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub twitter_username: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
}

/// GitHub user profile (`/users/{login}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(rename = "type", default)]
    pub owner_type: OwnerType,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub twitter_username: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
}

/// Organization member as listed by `/orgs/{org}/members`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub login: String,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
}

/// Repository contributor (`/repos/{owner}/{repo}/contributors`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub contributions: u64,
}

/// Repository license summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub key: String,
    pub name: String,
    pub spdx_id: Option<String>,
    pub url: Option<String>,
}

/// GitHub repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub private: bool,
    pub html_url: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub homepage: Option<String>,
    #[serde(default)]
    pub open_issues_count: u64,
    pub default_branch: Option<String>,
    pub license: Option<License>,
    #[serde(default)]
    pub size: u64,
}

impl Repository {
    /// The most recent of `pushed_at` and `updated_at`.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.pushed_at, self.updated_at) {
            (Some(pushed), Some(updated)) => Some(pushed.max(updated)),
            (pushed, updated) => pushed.or(updated),
        }
    }
}

/// Language name to byte count (`/repos/{owner}/{repo}/languages`).
pub type Languages = BTreeMap<String, u64>;

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}
