//! Interval polling with ref-counted subscriptions.
//!
//! Each polled key gets at most one timer task no matter how many
//! consumers subscribe to it. The first subscription spawns the timer, the
//! rest share it; handles unsubscribe on drop, and when the last one goes
//! the timer is stopped and removed.
//!
//! Poll jobs are spawned as detached tasks, so tearing down a timer never
//! cancels a request that is already in flight. If that request was
//! superseded in the meantime, its completion is discarded by the cache's
//! stale-response guard.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::key::QueryKey;

struct PollSlot {
    subscribers: usize,
    task: JoinHandle<()>,
}

struct SchedulerInner {
    slots: Mutex<HashMap<QueryKey, PollSlot>>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        let slots = self.slots.lock().unwrap();
        for slot in slots.values() {
            slot.task.abort();
        }
    }
}

/// Ref-counted per-key interval timers.
///
/// Cheap to clone; all clones share the same timer table. Dropping the last
/// clone (handles included) aborts every timer.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use vmoquery::{PollingScheduler, QueryKey};
///
/// #[tokio::main]
/// async fn main() {
///     let scheduler = PollingScheduler::new();
///     let handle = scheduler.subscribe(QueryKey::new("streams"), Duration::from_secs(30), || async {
///         // refresh the streams list
///     });
///
///     // ... the timer fires immediately, then every 30 seconds ...
///     drop(handle); // last subscriber gone: timer stops
/// }
/// ```
#[derive(Clone)]
pub struct PollingScheduler {
    inner: Arc<SchedulerInner>,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to periodic refresh of `key`.
    ///
    /// The first subscriber for a key starts its timer: `job` runs once
    /// immediately, then on every `every` tick. Later subscribers to the
    /// same key share the existing timer (its interval is not renegotiated)
    /// and only bump the ref-count.
    ///
    /// Each tick spawns `job()` as its own task; a slow job never delays
    /// the timer, and stopping the timer never cancels a job mid-flight.
    pub fn subscribe<F, Fut>(&self, key: QueryKey, every: Duration, job: F) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.inner.slots.lock().unwrap();
        match slots.get_mut(&key) {
            Some(slot) => {
                slot.subscribers += 1;
                tracing::debug!(key = %key, subscribers = slot.subscribers, "joined poll timer");
            }
            None => {
                let task = tokio::spawn(poll_loop(key.clone(), every, job));
                slots.insert(
                    key.clone(),
                    PollSlot {
                        subscribers: 1,
                        task,
                    },
                );
                tracing::debug!(key = %key, interval_ms = every.as_millis() as u64, "started poll timer");
            }
        }
        PollHandle {
            key,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of subscribers currently sharing the timer for `key`
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner
            .slots
            .lock()
            .unwrap()
            .get(key)
            .map(|slot| slot.subscribers)
            .unwrap_or(0)
    }

    /// Keys that currently have a running timer
    pub fn active_keys(&self) -> Vec<QueryKey> {
        self.inner.slots.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.inner.slots.lock().unwrap();
        f.debug_struct("PollingScheduler")
            .field("timers", &slots.len())
            .finish()
    }
}

async fn poll_loop<F, Fut>(key: QueryKey, every: Duration, job: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // First tick completes immediately: subscribing triggers a refresh
        ticker.tick().await;
        tracing::trace!(key = %key, "poll tick");
        tokio::spawn(job());
    }
}

/// Subscription to one polled key; unsubscribes on drop.
pub struct PollHandle {
    key: QueryKey,
    inner: Arc<SchedulerInner>,
}

impl PollHandle {
    /// Key this subscription refreshes
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let mut slots = self.inner.slots.lock().unwrap();
        let stop = match slots.get_mut(&self.key) {
            Some(slot) => {
                slot.subscribers -= 1;
                slot.subscribers == 0
            }
            None => false,
        };
        if stop {
            if let Some(slot) = slots.remove(&self.key) {
                slot.task.abort();
                tracing::debug!(key = %self.key, "stopped poll timer");
            }
        }
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle").field("key", &self.key).finish()
    }
}
