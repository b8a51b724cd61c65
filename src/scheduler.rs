// Background auto-refresh scheduling.
// Runs one periodic refresh task per organization and forwards fresh payloads to a notifier.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{ResourceKind, TtlCache};
use crate::error::{ProxyError, Result};

/// Receives the payload of every successful scheduled refresh.
pub trait RefreshNotifier: Send + Sync + 'static {
    fn notify(&self, org: &str, kind: ResourceKind, payload: Arc<Value>);
}

/// Handle to one running periodic task.
struct RefreshTask {
    interval: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Configured interval of an active task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub interval_ms: u64,
}

/// Snapshot returned by [`RefreshScheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub active: bool,
    pub tasks: BTreeMap<String, TaskStatus>,
}

/// Owns at most one periodic refresh task per organization.
///
/// Each task refreshes `kind` for its organization through the cache. The
/// first tick fires one interval after the task starts; a failed tick is
/// logged and the task keeps running until it is stopped.
pub struct RefreshScheduler {
    cache: TtlCache,
    kind: ResourceKind,
    notifier: Option<Arc<dyn RefreshNotifier>>,
    tasks: Mutex<HashMap<String, RefreshTask>>,
}

impl RefreshScheduler {
    /// Scheduler refreshing organization repositories.
    pub fn new(cache: TtlCache) -> Self {
        Self {
            cache,
            kind: ResourceKind::OrgRepos,
            notifier: None,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn RefreshNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Start refreshing `org` every `interval`.
    ///
    /// Returns `Ok(false)` without touching anything if `org` already has a task.
    pub fn start(&self, org: &str, interval: Duration) -> Result<bool> {
        let first_tick = first_tick_after(interval)?;

        let mut tasks = self.tasks.lock();
        if let Some(existing) = tasks.get(org) {
            info!(
                org,
                interval_ms = existing.interval.as_millis() as u64,
                "Auto-refresh already running"
            );
            return Ok(false);
        }

        tasks.insert(org.to_string(), self.spawn_task(org, first_tick, interval));
        info!(org, interval_secs = interval.as_secs_f64(), "Auto-refresh started");
        Ok(true)
    }

    /// Start every organization in `orgs`; returns how many were newly started.
    pub fn start_all<I, S>(&self, orgs: I, interval: Duration) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        first_tick_after(interval)?;

        let mut started = 0;
        for org in orgs {
            if self.start(org.as_ref(), interval)? {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Stop the task for `org`. Returns whether one was running.
    pub fn stop(&self, org: &str) -> bool {
        match self.tasks.lock().remove(org) {
            Some(task) => {
                task.token.cancel();
                info!(org, "Auto-refresh stopped");
                true
            }
            None => {
                debug!(org, "No auto-refresh to stop");
                false
            }
        }
    }

    /// Stop every task. Returns how many were running.
    pub fn stop_all(&self) -> usize {
        let stopped: Vec<_> = self.tasks.lock().drain().collect();
        for (_, task) in &stopped {
            task.token.cancel();
        }
        info!(stopped = stopped.len(), "All auto-refresh tasks stopped");
        stopped.len()
    }

    /// Replace the interval of a running task.
    ///
    /// The old task is cancelled and the new one starts counting from now,
    /// under one lock, so no tick of the old interval fires after this
    /// returns. Returns `Ok(false)` and creates nothing when `org` has no task.
    pub fn change_interval(&self, org: &str, interval: Duration) -> Result<bool> {
        let first_tick = first_tick_after(interval)?;

        let mut tasks = self.tasks.lock();
        let Some(old) = tasks.remove(org) else {
            debug!(org, "No auto-refresh to reschedule");
            return Ok(false);
        };
        old.token.cancel();
        tasks.insert(org.to_string(), self.spawn_task(org, first_tick, interval));

        info!(
            org,
            old_interval_secs = old.interval.as_secs_f64(),
            interval_secs = interval.as_secs_f64(),
            "Auto-refresh interval changed"
        );
        Ok(true)
    }

    pub fn is_active(&self, org: &str) -> bool {
        self.tasks.lock().contains_key(org)
    }

    pub fn status(&self) -> SchedulerStatus {
        let tasks: BTreeMap<String, TaskStatus> = self
            .tasks
            .lock()
            .iter()
            .map(|(org, task)| {
                let status = TaskStatus {
                    interval_ms: task.interval.as_millis() as u64,
                };
                (org.clone(), status)
            })
            .collect();

        SchedulerStatus {
            active: !tasks.is_empty(),
            tasks,
        }
    }

    /// Stop every task and wait for refreshes already underway to finish.
    pub async fn shutdown(&self) {
        let stopped: Vec<_> = self.tasks.lock().drain().collect();
        for (_, task) in &stopped {
            task.token.cancel();
        }
        for (org, task) in stopped {
            if let Err(e) = task.handle.await {
                warn!(org, error = %e, "Auto-refresh task ended abnormally");
            }
        }
        info!("Auto-refresh scheduler shut down");
    }

    fn spawn_task(&self, org: &str, first_tick: Instant, interval: Duration) -> RefreshTask {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_task(
            self.cache.clone(),
            self.kind,
            org.to_string(),
            first_tick,
            interval,
            token.clone(),
            self.notifier.clone(),
        ));

        RefreshTask {
            interval,
            token,
            handle,
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().values() {
            task.token.cancel();
        }
    }
}

/// Instant of the first tick for a task started now.
///
/// Rejects zero intervals and intervals too large to schedule.
fn first_tick_after(interval: Duration) -> Result<Instant> {
    if interval.is_zero() {
        return Err(ProxyError::InvalidArgument(
            "refresh interval must be positive".to_string(),
        ));
    }
    Instant::now().checked_add(interval).ok_or_else(|| {
        ProxyError::InvalidArgument(format!("refresh interval too large: {:?}", interval))
    })
}

/// Tick loop for one organization. Cancellation is only observed between
/// ticks; a refresh that has started always completes.
async fn run_task(
    cache: TtlCache,
    kind: ResourceKind,
    org: String,
    first_tick: Instant,
    interval: Duration,
    token: CancellationToken,
    notifier: Option<Arc<dyn RefreshNotifier>>,
) {
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        debug!(org, %kind, "Auto-refreshing");
        match cache.refresh(kind, &org).await {
            Ok(payload) => {
                info!(org, %kind, "Auto-refresh completed");
                if let Some(notifier) = &notifier {
                    notifier.notify(&org, kind, payload);
                }
            }
            Err(e) => warn!(org, %kind, error = %e, "Auto-refresh failed, serving previous data"),
        }
    }

    debug!(org, "Auto-refresh task exited");
}
