// Service assembly.
// Wires client, cache, scheduler and broadcaster together and serves the HTTP API.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::Result;
use crate::github::{GitHubClient, GitHubFetcher};
use crate::http::{AppState, router};
use crate::live::LiveBroadcaster;
use crate::scheduler::RefreshScheduler;

/// Build the shared state from configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    let client = Arc::new(GitHubClient::new(config.client_options())?);
    let fetcher = Arc::new(GitHubFetcher::new(client));
    let cache = TtlCache::with_ttl(fetcher, config.cache_ttl());
    let broadcaster = LiveBroadcaster::new();
    let scheduler = Arc::new(
        RefreshScheduler::new(cache.clone()).with_notifier(Arc::new(broadcaster.clone())),
    );

    Ok(AppState::new(cache, scheduler, broadcaster, &config.org))
}

/// Run until Ctrl-C or SIGTERM, then stop every refresh task.
pub async fn run(config: Config) -> Result<()> {
    let state = build_state(&config)?;
    let scheduler = state.scheduler.clone();

    if config.auto_refresh.enabled {
        let orgs = config.refresh_orgs();
        let started = scheduler.start_all(&orgs, config.auto_refresh_interval())?;
        info!(
            started,
            interval_secs = config.auto_refresh.interval_secs,
            "Auto-refresh enabled"
        );
    }

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!(%address, org = %config.org, "Listening");

    serve(listener, state, shutdown_signal()).await
}

/// Serve the API on `listener` until `signal` resolves.
///
/// On the signal, open event streams are ended so connections can drain, then
/// every refresh task is stopped.
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let scheduler = state.scheduler.clone();
    let shutdown = state.shutdown.clone();

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            signal.await;
            shutdown.cancel();
        })
        .await?;

    scheduler.shutdown().await;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
