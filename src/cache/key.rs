// Cache key construction.
// Identifies cached values by resource kind and organization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of upstream data held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    OrgRepos,
    Owner,
    OwnerRepos,
    OwnerReadme,
    Organization,
    OrgProfileReadme,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::OrgRepos => "orgRepos",
            ResourceKind::Owner => "owner",
            ResourceKind::OwnerRepos => "ownerRepos",
            ResourceKind::OwnerReadme => "ownerReadme",
            ResourceKind::Organization => "organization",
            ResourceKind::OrgProfileReadme => "orgProfileReadme",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite cache key: one cached value per (kind, organization).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub org: String,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, org: impl Into<String>) -> Self {
        Self {
            kind,
            org: org.into(),
        }
    }
}

/// Renders as `<kind>_<org>`, e.g. `orgRepos_acme`.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.org)
    }
}
