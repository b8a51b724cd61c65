// Resource assembly from the GitHub API.
// Implements the cache's fetch collaborator by combining endpoint calls and shaping the result.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cache::{ResourceFetcher, ResourceKind};
use crate::error::{ProxyError, Result};
use crate::shape::{self, ContributorSummary, RepoExtras};

use super::client::GitHubClient;
use super::types::Repository;

/// Repository that only carries the organization profile README.
const PROFILE_REPO: &str = ".github";

/// Fetches and shapes every [`ResourceKind`] from GitHub.
#[derive(Clone)]
pub struct GitHubFetcher {
    client: Arc<GitHubClient>,
}

impl GitHubFetcher {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }

    /// Public organization repositories with languages, README and contributors.
    pub async fn org_repos(&self, org: &str) -> Result<Value> {
        let repos: Vec<Repository> = self
            .client
            .get_org_repos(org)
            .await?
            .into_iter()
            .filter(|repo| !repo.private && repo.name != PROFILE_REPO)
            .collect();

        let shaped = try_join_all(repos.iter().map(|repo| async move {
            let languages = self.client.get_repo_languages(org, &repo.name).await?;
            let readme = self.client.get_repo_readme(org, &repo.name).await;
            let contributors = self.contributors(org, &repo.name).await;
            let extras = RepoExtras {
                languages,
                readme,
                contributors,
            };
            Ok::<_, ProxyError>(shape::shape_repo(repo, extras, Utc::now()))
        }))
        .await?;

        info!(org, repos = shaped.len(), "Fetched organization repositories");
        Ok(Value::Array(shaped))
    }

    /// Profile of the organization's first admin member.
    pub async fn owner(&self, org: &str) -> Result<Value> {
        let login = self.admin_login(org).await?;
        let user = self.client.get_user(&login).await?;
        Ok(shape::shape_user(&user, Utc::now()))
    }

    /// Public repositories of the organization's first admin.
    pub async fn owner_repos(&self, org: &str) -> Result<Value> {
        let login = self.admin_login(org).await?;
        let repos: Vec<Repository> = self
            .client
            .get_user_repos(&login)
            .await?
            .into_iter()
            .filter(|repo| !repo.private && repo.name != PROFILE_REPO && repo.name != login)
            .collect();

        let login = login.as_str();
        let shaped = try_join_all(repos.iter().map(|repo| async move {
            let languages = self.client.get_repo_languages(login, &repo.name).await?;
            let readme = self.client.get_repo_readme(login, &repo.name).await;
            let extras = RepoExtras {
                languages,
                readme,
                contributors: None,
            };
            Ok::<_, ProxyError>(shape::shape_repo(repo, extras, Utc::now()))
        }))
        .await?;

        Ok(Value::Array(shaped))
    }

    /// README of the admin's profile repository (`<login>/<login>`).
    pub async fn owner_readme(&self, org: &str) -> Result<Value> {
        let login = self.admin_login(org).await?;
        let readme = self.client.get_repo_readme(&login, &login).await;
        Ok(json!(readme))
    }

    pub async fn organization(&self, org: &str) -> Result<Value> {
        let organization = self.client.get_org(org).await?;
        Ok(shape::shape_organization(&organization, Utc::now()))
    }

    pub async fn org_profile_readme(&self, org: &str) -> Result<Value> {
        Ok(json!(self.client.get_profile_readme(org).await))
    }

    async fn admin_login(&self, org: &str) -> Result<String> {
        self.client
            .get_org_admins(org)
            .await?
            .into_iter()
            .next()
            .map(|member| member.login)
            .ok_or_else(|| ProxyError::NoAdmin(org.to_string()))
    }

    /// Contributors with display names. A failed list yields `None`; a failed
    /// profile lookup falls back to the login.
    async fn contributors(&self, owner: &str, repo: &str) -> Option<Vec<ContributorSummary>> {
        let contributors = match self.client.get_repo_contributors(owner, repo).await {
            Ok(contributors) => contributors,
            Err(e) => {
                debug!(owner, repo, error = %e, "Contributors unavailable");
                return None;
            }
        };

        let summaries = join_all(contributors.into_iter().map(|contributor| async move {
            let name = match self.client.get_user(&contributor.login).await {
                Ok(user) => user.name.filter(|n| !n.trim().is_empty()),
                Err(_) => None,
            };
            ContributorSummary {
                name: name.unwrap_or_else(|| contributor.login.clone()),
                login: contributor.login,
                avatar_url: contributor.avatar_url,
                html_url: contributor.html_url,
            }
        }))
        .await;

        (!summaries.is_empty()).then_some(summaries)
    }
}

#[async_trait]
impl ResourceFetcher for GitHubFetcher {
    async fn fetch(&self, kind: ResourceKind, org: &str) -> Result<Value> {
        match kind {
            ResourceKind::OrgRepos => self.org_repos(org).await,
            ResourceKind::Owner => self.owner(org).await,
            ResourceKind::OwnerRepos => self.owner_repos(org).await,
            ResourceKind::OwnerReadme => self.owner_readme(org).await,
            ResourceKind::Organization => self.organization(org).await,
            ResourceKind::OrgProfileReadme => self.org_profile_readme(org).await,
        }
    }
}
