// Response shaping for the front-end.
// Selects the fields the front-end renders, derives age strings, and prunes empty values.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::github::{Languages, Organization, Repository, User};

static README_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[.*?\]\((https?://[^\s)]+)\)").expect("README image pattern is valid")
});

/// Contributor as exposed to the front-end, with the display name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributorSummary {
    pub login: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
}

/// Per-repository data fetched alongside the repository itself.
#[derive(Debug, Clone, Default)]
pub struct RepoExtras {
    pub languages: Languages,
    pub readme: Option<String>,
    /// `None` when contributors are not part of the resource or could not be loaded.
    pub contributors: Option<Vec<ContributorSummary>>,
}

/// Elapsed time since a repository last changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Age {
    pub seconds: i64,
    pub milliseconds: i64,
    /// `DD:HH:MM:SS`
    pub formatted: String,
    /// "3 days ago", "1 hour ago", ...
    pub words: String,
}

impl Age {
    pub fn between(then: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let milliseconds = (now - then).num_milliseconds().max(0);
        let seconds = milliseconds / 1000;
        let minutes = seconds / 60;
        let hours = minutes / 60;
        let days = hours / 24;

        let words = if days > 0 {
            ago(days, "day")
        } else if hours > 0 {
            ago(hours, "hour")
        } else if minutes > 0 {
            ago(minutes, "minute")
        } else {
            ago(seconds, "second")
        };

        Self {
            seconds,
            milliseconds,
            formatted: format!(
                "{:02}:{:02}:{:02}:{:02}",
                days,
                hours % 24,
                minutes % 60,
                seconds % 60
            ),
            words,
        }
    }
}

fn ago(count: i64, unit: &str) -> String {
    let suffix = if count > 1 { "s" } else { "" };
    format!("{} {}{} ago", count, unit, suffix)
}

/// Recursively replace empty values with null.
///
/// Blank strings, empty arrays and empty objects become null; object members
/// that end up null are dropped, so an object of only empty members collapses
/// to null as well.
pub fn prune_empty(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::Array(items) if items.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(prune_empty).collect()),
        Value::Object(members) => {
            let pruned: Map<String, Value> = members
                .into_iter()
                .map(|(k, v)| (k, prune_empty(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

/// Convert language byte counts into percentages rounded to one decimal.
pub fn language_shares(languages: &Languages) -> Value {
    let total: u64 = languages.values().sum();
    if total == 0 {
        return Value::Null;
    }

    let shares: Map<String, Value> = languages
        .iter()
        .map(|(name, bytes)| {
            let share = (*bytes as f64 / total as f64 * 1000.0).round() / 10.0;
            (name.clone(), json!(share))
        })
        .collect();
    prune_empty(Value::Object(shares))
}

/// Pick the image shown for a repository card.
///
/// Uses the URL of a markdown image on the README's first line, otherwise the
/// trimmed first line itself.
pub fn repo_image(readme: Option<&str>) -> Option<String> {
    let first_line = readme?.lines().next().unwrap_or_default().trim();

    if let Some(url) = README_IMAGE.captures(first_line).and_then(|c| c.get(1)) {
        return Some(url.as_str().to_string());
    }

    (!first_line.is_empty()).then(|| first_line.to_string())
}

fn live_fields(now: DateTime<Utc>) -> [(&'static str, Value); 2] {
    [
        ("current_timestamp", json!(now.to_rfc3339())),
        ("live_unix_timestamp", json!(now.timestamp_millis())),
    ]
}

/// Shape a repository for the front-end.
pub fn shape_repo(repo: &Repository, extras: RepoExtras, now: DateTime<Utc>) -> Value {
    let age = repo.last_activity().map(|at| Age::between(at, now));
    let image = repo_image(extras.readme.as_deref());
    let homepage = repo
        .homepage
        .as_deref()
        .filter(|h| !h.trim().is_empty());

    let mut shaped = json!({
        "name": repo.name,
        "html_url": repo.html_url,
        "description": repo.description,
        "created_at": repo.created_at,
        "updated_at": repo.updated_at,
        "pushed_at": repo.pushed_at,
        "last_change": age.as_ref().map(|a| a.words.clone()),
        "live_seconds_elapsed": age.as_ref().map(|a| a.seconds),
        "live_milliseconds_elapsed": age.as_ref().map(|a| a.milliseconds),
        "live_time_formatted": age.as_ref().map(|a| a.formatted.clone()),
        "live_age_in_words": age.as_ref().map(|a| a.words.clone()),
        "topics": repo.topics,
        "homepage": homepage,
        "open_issues_count": repo.open_issues_count,
        "default_branch": repo.default_branch,
        "license": repo.license,
        "size": repo.size,
        "repo_image": image,
        "languages": language_shares(&extras.languages),
        "readme": extras.readme,
    });

    if let Value::Object(members) = &mut shaped {
        members.extend(live_fields(now).map(|(k, v)| (k.to_string(), v)));
        if let Some(contributors) = extras.contributors {
            members.insert("contributors".to_string(), json!(contributors));
        }
    }

    prune_empty(shaped)
}

/// Shape a user profile (the organization owner).
pub fn shape_user(user: &User, now: DateTime<Utc>) -> Value {
    let mut shaped = json!({
        "login": user.login,
        "avatar_url": user.avatar_url,
        "html_url": user.html_url,
        "name": user.name,
        "company": user.company,
        "location": user.location,
        "email": user.email,
        "bio": user.bio,
        "twitter_username": user.twitter_username,
        "public_repos": user.public_repos,
    });
    if let Value::Object(members) = &mut shaped {
        members.extend(live_fields(now).map(|(k, v)| (k.to_string(), v)));
    }
    prune_empty(shaped)
}

/// Shape an organization profile.
pub fn shape_organization(org: &Organization, now: DateTime<Utc>) -> Value {
    let mut shaped = json!({
        "login": org.login,
        "avatar_url": org.avatar_url,
        "description": org.description,
        "name": org.name,
        "location": org.location,
        "email": org.email,
        "twitter_username": org.twitter_username,
        "public_repos": org.public_repos,
        "html_url": org.html_url,
    });
    if let Value::Object(members) = &mut shaped {
        members.extend(live_fields(now).map(|(k, v)| (k.to_string(), v)));
    }
    prune_empty(shaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_prune_empty_collapses_nested_empties() {
        let pruned = prune_empty(json!({
            "name": "site",
            "description": "   ",
            "topics": [],
            "license": { "spdx_id": "" },
            "size": 0,
            "flags": [false, ""],
        }));

        assert_eq!(
            pruned,
            json!({ "name": "site", "size": 0, "flags": [false, null] })
        );
        assert_eq!(prune_empty(json!({ "a": null, "b": [] })), Value::Null);
    }

    #[test]
    fn test_language_shares_rounding() {
        let languages: Languages = [("Rust".to_string(), 2), ("Shell".to_string(), 1)]
            .into_iter()
            .collect();

        assert_eq!(
            language_shares(&languages),
            json!({ "Rust": 66.7, "Shell": 33.3 })
        );
        assert_eq!(language_shares(&Languages::new()), Value::Null);
    }

    #[test]
    fn test_repo_image_prefers_markdown_image() {
        let readme = "![banner](https://img.example.com/banner.png)\n# Title";
        assert_eq!(
            repo_image(Some(readme)).as_deref(),
            Some("https://img.example.com/banner.png")
        );
        assert_eq!(repo_image(Some("  # Title  \nbody")).as_deref(), Some("# Title"));
        assert_eq!(repo_image(Some("\nbody")), None);
        assert_eq!(repo_image(None), None);
    }

    #[test]
    fn test_age_words_and_format() {
        let now = at(2024, 5, 3, 12, 0, 0);

        let age = Age::between(at(2024, 5, 1, 10, 30, 15), now);
        assert_eq!(age.words, "2 days ago");
        assert_eq!(age.formatted, "02:01:29:45");

        assert_eq!(Age::between(at(2024, 5, 3, 11, 0, 0), now).words, "1 hour ago");
        assert_eq!(Age::between(at(2024, 5, 3, 11, 59, 59), now).words, "1 second ago");
        assert_eq!(Age::between(now, now).words, "0 second ago");
        // Clock skew never yields negative ages.
        assert_eq!(Age::between(at(2024, 5, 4, 0, 0, 0), now).seconds, 0);
    }

    #[test]
    fn test_shape_repo_fields() {
        let repo: Repository = serde_json::from_value(json!({
            "name": "site",
            "html_url": "https://github.com/acme/site",
            "description": "Company site",
            "pushed_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-04-01T12:00:00Z",
            "topics": ["web"],
            "homepage": " ",
            "size": 42
        }))
        .unwrap();
        let extras = RepoExtras {
            languages: [("Rust".to_string(), 10)].into_iter().collect(),
            readme: Some("![logo](https://img.example.com/l.png)".to_string()),
            contributors: Some(vec![ContributorSummary {
                login: "octo".to_string(),
                name: "Octo Cat".to_string(),
                avatar_url: None,
                html_url: None,
            }]),
        };

        let shaped = shape_repo(&repo, extras, at(2024, 5, 2, 12, 0, 0));

        assert_eq!(shaped["name"], "site");
        assert_eq!(shaped["last_change"], "1 day ago");
        assert_eq!(shaped["live_seconds_elapsed"], 86_400);
        assert_eq!(shaped["repo_image"], "https://img.example.com/l.png");
        assert_eq!(shaped["languages"], json!({ "Rust": 100.0 }));
        assert_eq!(shaped["contributors"][0]["name"], "Octo Cat");
        assert!(shaped.get("homepage").is_none());
        assert!(shaped.get("license").is_none());
    }

    #[test]
    fn test_shape_repo_without_contributors_omits_key() {
        let repo: Repository = serde_json::from_value(json!({
            "name": "dotfiles",
            "html_url": "https://github.com/octo/dotfiles"
        }))
        .unwrap();

        let shaped = shape_repo(&repo, RepoExtras::default(), Utc::now());

        assert!(shaped.get("contributors").is_none());
        assert!(shaped.get("last_change").is_none());
        assert!(shaped.get("languages").is_none());
    }

    #[test]
    fn test_shape_organization_drops_empty_fields() {
        let org: Organization = serde_json::from_value(json!({
            "login": "acme",
            "name": "Acme",
            "description": "",
            "public_repos": 3
        }))
        .unwrap();

        let shaped = shape_organization(&org, Utc::now());

        assert_eq!(shaped["name"], "Acme");
        assert_eq!(shaped["public_repos"], 3);
        assert!(shaped.get("description").is_none());
        assert!(shaped.get("current_timestamp").is_some());
    }
}
