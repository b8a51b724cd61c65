// Test doubles for the cache's fetch collaborator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{ProxyError, Result};

use super::{ResourceFetcher, ResourceKind};

/// Counts calls and answers `{kind, org, call}`; call `n` first sleeps
/// `delays[n]` when one is scripted.
#[derive(Default)]
pub struct ScriptedFetcher {
    calls: AtomicUsize,
    delays: Vec<Duration>,
    failing: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delays(delays: Vec<Duration>) -> Arc<Self> {
        Arc::new(Self {
            delays,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceFetcher for ScriptedFetcher {
    async fn fetch(&self, kind: ResourceKind, org: &str) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(call) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProxyError::Other(format!("upstream down for {}", org)));
        }
        Ok(json!({ "kind": kind.as_str(), "org": org, "call": call }))
    }
}
