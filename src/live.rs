// Live update broadcasting.
// Fans scheduler refresh payloads out to Server-Sent-Event subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::ResourceKind;
use crate::scheduler::RefreshNotifier;

/// Buffer size for the broadcast channel. Slow subscribers that fall further
/// behind skip the oldest updates.
const DEFAULT_BUFFER_SIZE: usize = 64;

/// One refreshed payload as pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct LiveUpdate {
    pub org: String,
    pub kind: ResourceKind,
    /// Number of scheduled refreshes broadcast since startup, this one included.
    pub refresh_count: u64,
    pub timestamp: DateTime<Utc>,
    pub data: Arc<Value>,
}

/// Broadcaster for refreshed data, shared between the scheduler and the SSE endpoint.
#[derive(Clone)]
pub struct LiveBroadcaster {
    sender: broadcast::Sender<LiveUpdate>,
    refresh_count: Arc<AtomicU64>,
}

impl LiveBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            refresh_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send an update to all subscribers.
    ///
    /// Returns the number of subscribers that received it; 0 when nobody listens.
    pub fn send(&self, update: LiveUpdate) -> usize {
        self.sender.send(update).unwrap_or_default()
    }

    /// Subscribe to updates sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }
}

impl Default for LiveBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshNotifier for LiveBroadcaster {
    fn notify(&self, org: &str, kind: ResourceKind, payload: Arc<Value>) {
        let refresh_count = self.refresh_count.fetch_add(1, Ordering::Relaxed) + 1;
        let delivered = self.send(LiveUpdate {
            org: org.to_string(),
            kind,
            refresh_count,
            timestamp: Utc::now(),
            data: payload,
        });
        debug!(org, %kind, delivered, "Broadcast live update");
    }
}
