// GitHub API endpoint functions.
// Provides typed methods for the organization, user, repository and README lookups.

use crate::error::Result;

use super::client::GitHubClient;
use super::types::{Contributor, Languages, Member, Organization, Repository, User};

/// Page size for list endpoints; GitHub caps it at 100.
const PER_PAGE: &str = "100";

impl GitHubClient {
    /// Get an organization profile.
    pub async fn get_org(&self, org: &str) -> Result<Organization> {
        self.get_json(&format!("/orgs/{}", org)).await
    }

    /// Get repositories for an organization.
    pub async fn get_org_repos(&self, org: &str) -> Result<Vec<Repository>> {
        let params = [("per_page", PER_PAGE)];
        self.get_json_with_params(&format!("/orgs/{}/repos", org), &params)
            .await
    }

    /// Get the admin members of an organization.
    pub async fn get_org_admins(&self, org: &str) -> Result<Vec<Member>> {
        let params = [("role", "admin")];
        self.get_json_with_params(&format!("/orgs/{}/members", org), &params)
            .await
    }

    /// Get a user profile.
    pub async fn get_user(&self, login: &str) -> Result<User> {
        self.get_json(&format!("/users/{}", login)).await
    }

    /// Get public repositories owned by a user.
    pub async fn get_user_repos(&self, login: &str) -> Result<Vec<Repository>> {
        let params = [("per_page", PER_PAGE)];
        self.get_json_with_params(&format!("/users/{}/repos", login), &params)
            .await
    }

    /// Get the language byte counts for a repository.
    pub async fn get_repo_languages(&self, owner: &str, repo: &str) -> Result<Languages> {
        self.get_json(&format!("/repos/{}/{}/languages", owner, repo))
            .await
    }

    /// Get contributors for a repository.
    pub async fn get_repo_contributors(&self, owner: &str, repo: &str) -> Result<Vec<Contributor>> {
        self.get_json(&format!("/repos/{}/{}/contributors", owner, repo))
            .await
    }

    /// Get a repository README from the default `main` branch.
    pub async fn get_repo_readme(&self, owner: &str, repo: &str) -> Option<String> {
        self.get_raw_text(&format!("{}/{}/refs/heads/main/README.md", owner, repo))
            .await
    }

    /// Get the organization profile README (`.github/profile/README.md`).
    pub async fn get_profile_readme(&self, org: &str) -> Option<String> {
        self.get_raw_text(&format!(
            "{}/.github/refs/heads/main/profile/README.md",
            org
        ))
        .await
    }
}
