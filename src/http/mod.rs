// HTTP API module.
// Builds the axum router over explicitly constructed cache, scheduler and broadcaster instances.

pub mod admin;
pub mod data;
pub mod projection;
pub mod sse;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::cache::TtlCache;
use crate::error::ProxyError;
use crate::live::LiveBroadcaster;
use crate::scheduler::RefreshScheduler;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub cache: TtlCache,
    pub scheduler: Arc<RefreshScheduler>,
    pub broadcaster: LiveBroadcaster,
    /// Organization served by the data endpoints.
    pub org: Arc<str>,
    /// Cancelled when the server starts shutting down; ends open event streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        cache: TtlCache,
        scheduler: Arc<RefreshScheduler>,
        broadcaster: LiveBroadcaster,
        org: &str,
    ) -> Self {
        Self {
            cache,
            scheduler,
            broadcaster,
            org: Arc::from(org),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let auto_refresh = Router::new()
        .route("/start", post(admin::start_auto_refresh))
        .route("/stop/{org}", delete(admin::stop_auto_refresh))
        .route("/stop-all", delete(admin::stop_all_auto_refresh))
        .route("/interval/{org}", put(admin::change_interval))
        .route("/status", get(admin::auto_refresh_status));

    Router::new()
        .route("/", get(data::index))
        .route("/about", get(data::about))
        .route("/repos", get(data::repos))
        .route("/repos/refresh", post(data::refresh_repos))
        .route("/live-data", get(data::live_data))
        .route("/owner", get(data::owner))
        .route("/owner/repos", get(data::owner_repos))
        .route("/cache", get(admin::cache_info).delete(admin::clear_cache))
        .route("/cache/ttl", put(admin::set_cache_ttl))
        .route("/sse", get(sse::events))
        .nest("/auto-refresh", auto_refresh)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            e if e.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use futures::StreamExt;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tower::ServiceExt;

    use crate::cache::{ResourceFetcher, ResourceKind};
    use crate::error::Result;
    use crate::scheduler::RefreshNotifier;

    /// Serves fixed payloads per resource kind.
    #[derive(Default)]
    struct FixtureFetcher {
        calls: AtomicUsize,
        down: AtomicBool,
    }

    #[async_trait]
    impl ResourceFetcher for FixtureFetcher {
        async fn fetch(&self, kind: ResourceKind, org: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(ProxyError::Unauthorized);
            }
            Ok(match kind {
                ResourceKind::OrgRepos | ResourceKind::OwnerRepos => json!([
                    {
                        "name": "site",
                        "topics": ["web"],
                        "languages": { "Rust": 75.0, "CSS": 25.0 },
                        "readme": "# Site"
                    },
                    { "name": "scratch" }
                ]),
                ResourceKind::Organization => json!({ "login": org, "name": "Acme" }),
                ResourceKind::OrgProfileReadme => json!("# Acme"),
                ResourceKind::Owner => json!({ "login": "octo", "name": "Octo", "bio": "" }),
                ResourceKind::OwnerReadme => Value::Null,
            })
        }
    }

    fn app() -> (Router, Arc<FixtureFetcher>, AppState) {
        let fetcher = Arc::new(FixtureFetcher::default());
        let cache = TtlCache::new(fetcher.clone());
        let broadcaster = LiveBroadcaster::new();
        let scheduler = Arc::new(
            RefreshScheduler::new(cache.clone()).with_notifier(Arc::new(broadcaster.clone())),
        );
        let state = AppState::new(cache, scheduler, broadcaster, "acme");
        (router(state.clone()), fetcher, state)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_repos_filters_and_projects() {
        let (app, fetcher, _) = app();

        let (status, body) = call(
            &app,
            Method::GET,
            "/repos?repoFields=name,languages&languageFields=Rust",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{ "name": "site", "languages": { "Rust": 75.0 } }]));

        call(&app, Method::GET, "/repos", None).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repos_fresh_bypasses_cache() {
        let (app, fetcher, _) = app();

        call(&app, Method::GET, "/repos", None).await;
        call(&app, Method::GET, "/repos?fresh=true", None).await;
        let (status, body) = call(&app, Method::POST, "/repos/refresh", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "site");
        assert!(body["timestamp"].is_string());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_about_merges_profile_readme() {
        let (app, _, _) = app();

        let (status, body) = call(&app, Method::GET, "/about?fields=name,readme", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "name": "Acme", "readme": "# Acme" }));
    }

    #[tokio::test]
    async fn test_owner_prunes_empty_fields() {
        let (app, _, _) = app();

        let (_, owner) = call(&app, Method::GET, "/owner", None).await;
        assert_eq!(owner, json!({ "login": "octo", "name": "Octo" }));

        let (_, repos) = call(&app, Method::GET, "/owner/repos?fields=name", None).await;
        assert_eq!(repos, json!([{ "name": "site" }]));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let (app, fetcher, _) = app();
        fetcher.down.store(true, Ordering::SeqCst);

        let (status, body) = call(&app, Method::GET, "/repos", None).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("orgRepos_acme"));
    }

    #[tokio::test]
    async fn test_cache_info_and_clear() {
        let (app, fetcher, _) = app();

        call(&app, Method::GET, "/repos", None).await;
        let (_, info) = call(&app, Method::GET, "/cache", None).await;
        assert_eq!(info["entries"]["orgRepos_acme"]["isStale"], false);
        assert_eq!(info["ttlSeconds"], 30);

        let (status, _) = call(&app, Method::DELETE, "/cache", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, info) = call(&app, Method::GET, "/cache", None).await;
        assert_eq!(info["entries"], json!({}));

        call(&app, Method::GET, "/repos", None).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_cache_ttl() {
        let (app, _, state) = app();

        let (status, _) = call(&app, Method::PUT, "/cache/ttl", Some(json!({ "seconds": 90 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.cache.ttl().as_secs(), 90);

        let (status, _) = call(&app, Method::PUT, "/cache/ttl", Some(json!({ "seconds": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.cache.ttl().as_secs(), 90);
    }

    #[tokio::test]
    async fn test_auto_refresh_lifecycle() {
        let (app, _, state) = app();

        let (status, body) = call(
            &app,
            Method::POST,
            "/auto-refresh/start",
            Some(json!({ "org": "acme", "interval": "5" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["started"], true);

        let (_, body) = call(&app, Method::GET, "/auto-refresh/status", None).await;
        assert_eq!(body["status"]["active"], true);
        assert_eq!(body["status"]["tasks"]["acme"]["intervalMs"], 300_000);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/auto-refresh/interval/acme",
            Some(json!({ "interval": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert_eq!(state.scheduler.status().tasks["acme"].interval_ms, 120_000);

        let (status, _) = call(&app, Method::DELETE, "/auto-refresh/stop/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.scheduler.status().active);
    }

    #[tokio::test]
    async fn test_start_defaults_to_served_org() {
        let (app, _, state) = app();

        let (status, body) = call(&app, Method::POST, "/auto-refresh/start", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interval"], "10 minutes");
        assert_eq!(state.scheduler.status().tasks["acme"].interval_ms, 600_000);

        let (_, body) = call(&app, Method::DELETE, "/auto-refresh/stop-all", None).await;
        assert_eq!(body["stopped"], 1);
    }

    #[tokio::test]
    async fn test_change_interval_requires_interval() {
        let (app, _, state) = app();
        state.scheduler.start("acme", std::time::Duration::from_secs(60)).unwrap();

        let (status, body) =
            call(&app, Method::PUT, "/auto-refresh/interval/acme", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("interval"));

        let (status, _) = call(
            &app,
            Method::PUT,
            "/auto-refresh/interval/acme",
            Some(json!({ "interval": "soon" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.scheduler.status().tasks["acme"].interval_ms, 60_000);
    }

    #[tokio::test]
    async fn test_sse_streams_connected_then_refresh() {
        let (app, _, state) = app();

        let response = app
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let mut frames = response.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("event: connected"));

        state
            .broadcaster
            .notify("acme", ResourceKind::OrgRepos, Arc::new(json!([])));
        let second = frames.next().await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&second);
        assert!(text.contains("event: refresh"));
        assert!(text.contains("\"org\":\"acme\""));
    }

    #[tokio::test]
    async fn test_oversized_interval_is_bad_request() {
        let (app, _, state) = app();

        let (status, body) = call(
            &app,
            Method::POST,
            "/auto-refresh/start",
            Some(json!({ "org": "acme", "interval": 1e300 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("too large"));
        assert!(!state.scheduler.is_active("acme"));
    }

    #[tokio::test]
    async fn test_live_data_reports_refresh_state() {
        let (app, _, state) = app();
        state.scheduler.start("acme", std::time::Duration::from_secs(60)).unwrap();
        state
            .broadcaster
            .notify("acme", ResourceKind::OrgRepos, Arc::new(json!([])));

        let (status, body) = call(&app, Method::GET, "/live-data?fields=name", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["repos"], json!([{ "name": "site" }]));
        let meta = &body["live_metadata"];
        assert_eq!(meta["refresh_count"], 1);
        assert_eq!(meta["auto_refresh_active"], true);
        assert_eq!(meta["auto_refresh_interval_ms"], 60_000);
        assert_eq!(meta["cache_ttl_seconds"], 30);
        assert!(meta["last_refresh"].is_string());
        assert!(meta["server_time"].is_string());
    }
}
