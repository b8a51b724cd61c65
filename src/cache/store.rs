// In-memory TTL cache for shaped GitHub resources.
// Decides staleness, shares one in-flight fetch per key, and reports cache diagnostics.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};

use super::key::{CacheKey, ResourceKind};

/// Default TTL for cached resources: 30 seconds.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Upstream source for cached resources.
///
/// Implementations own retry and backoff; the cache calls `fetch` once per
/// refresh and never retries on its own.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + 'static {
    async fn fetch(&self, kind: ResourceKind, org: &str) -> Result<Value>;
}

type FetchOutcome = std::result::Result<Arc<Value>, Arc<ProxyError>>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// A successfully fetched value and when it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<Value>,
    /// Monotonic fetch time, used for staleness.
    pub fetched_at: Instant,
    /// Wall-clock fetch time, used for reporting.
    pub refreshed_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(value: Arc<Value>) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            refreshed_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Stale once the age exceeds the TTL; an entry exactly `ttl` old is still fresh.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }
}

/// Diagnostic view of one cached key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub age_seconds: u64,
    pub is_stale: bool,
    pub last_refresh_iso: DateTime<Utc>,
}

/// Snapshot returned by [`TtlCache::info`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Keyed by the rendered cache key (`orgRepos_acme`).
    pub entries: BTreeMap<String, EntryInfo>,
    pub ttl_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    ttl: Duration,
    next_generation: u64,
}

struct Inner {
    fetcher: Arc<dyn ResourceFetcher>,
    state: Mutex<CacheState>,
}

/// TTL cache keyed by (resource kind, organization).
///
/// Cloning is cheap and every clone shares the same entries. Concurrent `get`
/// calls on a missing or stale key share a single upstream fetch; `refresh`
/// always starts a new one. A fetch writes its result on completion, so when
/// two fetches for one key overlap the one that finishes last wins.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<Inner>,
}

impl TtlCache {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::with_ttl(fetcher, DEFAULT_TTL)
    }

    pub fn with_ttl(fetcher: Arc<dyn ResourceFetcher>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    in_flight: HashMap::new(),
                    ttl,
                    next_generation: 0,
                }),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.state.lock().ttl
    }

    /// Change the TTL used by every later staleness check.
    pub fn set_ttl(&self, ttl: Duration) {
        self.inner.state.lock().ttl = ttl;
        info!(ttl_secs = ttl.as_secs_f64(), "Cache TTL updated");
    }

    /// Return the cached value if it is fresh, otherwise fetch it.
    pub async fn get(&self, kind: ResourceKind, org: &str) -> Result<Arc<Value>> {
        let key = CacheKey::new(kind, org);
        let fetch = {
            let mut state = self.inner.state.lock();
            if let Some(entry) = state.entries.get(&key) {
                if !entry.is_stale(state.ttl) {
                    debug!(key = %key, age_secs = entry.age().as_secs(), "Using cached data");
                    return Ok(Arc::clone(&entry.value));
                }
            }

            let pending = state.in_flight.get(&key).map(|f| f.fetch.clone());
            match pending {
                Some(fetch) => {
                    debug!(key = %key, "Joining in-flight fetch");
                    fetch
                }
                None => self.start_fetch(&mut state, &key),
            }
        };

        wait_for(key, fetch).await
    }

    /// Fetch the value unconditionally and store it.
    ///
    /// On failure the previous entry, if any, is left untouched.
    pub async fn refresh(&self, kind: ResourceKind, org: &str) -> Result<Arc<Value>> {
        let key = CacheKey::new(kind, org);
        let fetch = {
            let mut state = self.inner.state.lock();
            self.start_fetch(&mut state, &key)
        };

        wait_for(key, fetch).await
    }

    /// Drop every entry and forget in-flight fetches.
    pub fn invalidate_all(&self) {
        let mut state = self.inner.state.lock();
        let cleared = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        info!(cleared, "Cache cleared");
    }

    /// Age and staleness of every cached key. Never fetches.
    pub fn info(&self) -> CacheInfo {
        let state = self.inner.state.lock();
        let entries = state
            .entries
            .iter()
            .map(|(key, entry)| {
                let info = EntryInfo {
                    age_seconds: entry.age().as_secs(),
                    is_stale: entry.is_stale(state.ttl),
                    last_refresh_iso: entry.refreshed_at,
                };
                (key.to_string(), info)
            })
            .collect();

        CacheInfo {
            entries,
            ttl_seconds: state.ttl.as_secs(),
            timestamp: Utc::now(),
        }
    }

    /// Register a new fetch for `key` as the in-flight one and start driving it.
    fn start_fetch(&self, state: &mut CacheState, key: &CacheKey) -> SharedFetch {
        let generation = state.next_generation;
        state.next_generation += 1;

        let inner = Arc::clone(&self.inner);
        let fetch_key = key.clone();
        let fetch = async move {
            debug!(key = %fetch_key, "Fetching fresh data");
            let result = inner.fetcher.fetch(fetch_key.kind, &fetch_key.org).await;

            let mut state = inner.state.lock();
            if state
                .in_flight
                .get(&fetch_key)
                .is_some_and(|f| f.generation == generation)
            {
                state.in_flight.remove(&fetch_key);
            }

            match result {
                Ok(value) => {
                    let value = Arc::new(value);
                    state
                        .entries
                        .insert(fetch_key.clone(), CacheEntry::new(Arc::clone(&value)));
                    info!(key = %fetch_key, "Data refreshed");
                    Ok(value)
                }
                Err(e) => {
                    warn!(key = %fetch_key, error = %e, "Fetch failed, previous entry kept");
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            key.clone(),
            InFlight {
                generation,
                fetch: fetch.clone(),
            },
        );

        // Completes and writes through even if every caller goes away.
        tokio::spawn(fetch.clone().map(|_| ()));

        fetch
    }
}

async fn wait_for(key: CacheKey, fetch: SharedFetch) -> Result<Arc<Value>> {
    fetch.await.map_err(|source| ProxyError::Upstream {
        key: key.to_string(),
        source,
    })
}
