// Data endpoints.
// Serve cached organization and owner resources, filtered and projected for the front-end.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use super::projection::{FieldsQuery, RepoListQuery, project_object, project_repos};
use crate::cache::{CacheKey, ResourceKind};
use crate::error::Result;
use crate::shape::prune_empty;

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "GitHub organization proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/about", "/repos", "/repos/refresh", "/live-data", "/owner", "/owner/repos",
            "/cache", "/cache/ttl", "/auto-refresh/status", "/sse"
        ],
    }))
}

/// Attach a README payload to an object under `readme`.
fn with_readme(base: &Value, readme: &Value) -> Value {
    let mut merged = base.clone();
    if let Value::Object(members) = &mut merged {
        members.insert("readme".to_string(), readme.clone());
    }
    merged
}

/// Prune each list item but keep the list itself, even when empty.
fn prune_items(list: Value) -> Value {
    match list {
        Value::Array(items) => Value::Array(items.into_iter().map(prune_empty).collect()),
        other => prune_empty(other),
    }
}

pub async fn about(
    State(state): State<AppState>,
    Query(query): Query<FieldsQuery>,
) -> Result<Json<Value>> {
    let (org, readme) = tokio::try_join!(
        state.cache.get(ResourceKind::Organization, &state.org),
        state.cache.get(ResourceKind::OrgProfileReadme, &state.org),
    )?;

    let merged = with_readme(&org, &readme);
    Ok(Json(prune_empty(project_object(&merged, query.fields.as_deref()))))
}

pub async fn repos(
    State(state): State<AppState>,
    Query(query): Query<RepoListQuery>,
) -> Result<Json<Value>> {
    let repos = if query.fresh() {
        state.cache.refresh(ResourceKind::OrgRepos, &state.org).await?
    } else {
        state.cache.get(ResourceKind::OrgRepos, &state.org).await?
    };

    Ok(Json(prune_items(project_repos(&repos, &query))))
}

pub async fn refresh_repos(State(state): State<AppState>) -> Result<Json<Value>> {
    let data: Arc<Value> = state.cache.refresh(ResourceKind::OrgRepos, &state.org).await?;
    info!(org = %state.org, "Repositories refreshed on request");

    Ok(Json(json!({
        "message": "Repositories refreshed",
        "timestamp": Utc::now(),
        "data": data,
    })))
}

/// Organization repositories plus the live refresh state polled by dashboards.
pub async fn live_data(
    State(state): State<AppState>,
    Query(query): Query<RepoListQuery>,
) -> Result<Json<Value>> {
    let repos = state.cache.get(ResourceKind::OrgRepos, &state.org).await?;

    let key = CacheKey::new(ResourceKind::OrgRepos, &*state.org).to_string();
    let last_refresh = state
        .cache
        .info()
        .entries
        .remove(&key)
        .map(|entry| entry.last_refresh_iso);
    let interval_ms = state
        .scheduler
        .status()
        .tasks
        .get(&*state.org)
        .map(|task| task.interval_ms);

    Ok(Json(json!({
        "repos": prune_items(project_repos(&repos, &query)),
        "live_metadata": {
            "refresh_count": state.broadcaster.refresh_count(),
            "last_refresh": last_refresh,
            "server_time": Utc::now(),
            "auto_refresh_active": state.scheduler.is_active(&state.org),
            "auto_refresh_interval_ms": interval_ms,
            "cache_ttl_seconds": state.cache.ttl().as_secs(),
        },
    })))
}

pub async fn owner(
    State(state): State<AppState>,
    Query(query): Query<FieldsQuery>,
) -> Result<Json<Value>> {
    let (owner, readme) = tokio::try_join!(
        state.cache.get(ResourceKind::Owner, &state.org),
        state.cache.get(ResourceKind::OwnerReadme, &state.org),
    )?;

    let merged = with_readme(&owner, &readme);
    Ok(Json(prune_empty(project_object(&merged, query.fields.as_deref()))))
}

pub async fn owner_repos(
    State(state): State<AppState>,
    Query(query): Query<RepoListQuery>,
) -> Result<Json<Value>> {
    let repos = if query.fresh() {
        state.cache.refresh(ResourceKind::OwnerRepos, &state.org).await?
    } else {
        state.cache.get(ResourceKind::OwnerRepos, &state.org).await?
    };

    Ok(Json(prune_items(project_repos(&repos, &query))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_readme_only_touches_objects() {
        let merged = with_readme(&json!({ "login": "acme" }), &json!("# Acme"));
        assert_eq!(merged, json!({ "login": "acme", "readme": "# Acme" }));

        assert_eq!(with_readme(&json!([1]), &json!("# Acme")), json!([1]));
    }

    #[test]
    fn test_prune_items_keeps_empty_list() {
        assert_eq!(prune_items(json!([])), json!([]));
        assert_eq!(
            prune_items(json!([{ "name": "site", "homepage": "" }])),
            json!([{ "name": "site" }])
        );
    }
}
