//! Dashboard data store
//!
//! This module wires the HTTP client into per-resource caches and a
//! polling scheduler, providing the data layer a dashboard renders from:
//! read-through accessors, non-blocking snapshots, interval refresh
//! subscriptions, and mutations that invalidate exactly the resources
//! they touch.
//!
//! # Example
//!
//! ```no_run
//! use vmoclient::DashboardStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DashboardStore::new()?;
//!
//!     // Keep the stream list fresh while the dashboard is visible
//!     let _poll = store.watch_streams();
//!
//!     let streams = store.streams().await?;
//!     println!("{} streams registered", streams.len());
//!
//!     for event in store.recent_events().await? {
//!         println!("[{}] {}", event.stream_name, event.record.event_type);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Caching Strategy
//!
//! Every resource is cached under a [`QueryKey`] with a 30 second
//! staleness window. Reads inside the window are served from memory;
//! reads outside it re-fetch. Concurrent reads of one key share a single
//! request, and a completion that was superseded by a newer fetch or an
//! invalidation is discarded instead of applied.
//!
//! # Thread Safety
//!
//! The store is cheap to clone and safe to share across tasks; clones
//! share the same caches, scheduler, and HTTP connection pool.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use vmoquery::{PollHandle, PollingScheduler, QueryKey, ResourceCache, Snapshot};

use crate::aggregate::{
    fan_out, merge_branches, normalize_chronological, EventFilter, StreamSelector, Tagged,
    RECENT_EVENTS_CAP,
};
use crate::client::MonitorClient;
use crate::error::Result;
use crate::models::{
    merge_running_state, Ack, AnalyticsSample, DashboardSummary, MetricSample, NewStream,
    StreamEvent, SystemStatus, VideoStream,
};
use crate::mutations::validate_new_stream;

/// Staleness window shared by every cache (30 seconds)
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Poll interval for the stream list
pub const STREAMS_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Poll interval for the system status
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Poll interval for the dashboard summary
pub const SUMMARY_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Poll interval for aggregated events
pub const EVENTS_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Poll interval for everything without a dedicated one
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Staleness window applied to every cache
    pub stale_after: Duration,
    /// Event type the dashboard's recent-events pass filters on; `None`
    /// keeps every type
    pub default_event_type: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            default_event_type: None,
        }
    }
}

// ===== Cache keys =====

fn streams_key() -> QueryKey {
    QueryKey::new("streams")
}

fn stream_key(stream_id: i64) -> QueryKey {
    QueryKey::new("stream").with(stream_id)
}

fn status_key() -> QueryKey {
    QueryKey::new("system_status")
}

fn summary_key() -> QueryKey {
    QueryKey::new("dashboard_summary")
}

fn metrics_key(hours: u32) -> QueryKey {
    QueryKey::new("system_metrics").with(hours)
}

fn analytics_key(stream_id: i64, hours: u32) -> QueryKey {
    QueryKey::new("stream_analytics").with(stream_id).with(hours)
}

/// Force a re-fetch of one key, skipping the turn if one is in flight
///
/// Timer ticks go through here instead of `resolve` so a tick refreshes
/// even when the entry is still inside its staleness window.
async fn force_refresh<T, F, Fut>(cache: &ResourceCache<T>, key: &QueryKey, fetch: F)
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(token) = cache.begin_fetch(key) else {
        return;
    };
    let outcome = fetch().await.map_err(|e| e.to_string());
    if let Err(reason) = &outcome {
        tracing::warn!(key = %key, %reason, "background refresh failed");
    }
    cache.complete_fetch(key, token, outcome);
}

/// Cached, polling data layer over the monitoring API
///
/// One store serves a whole dashboard: every view reads through the same
/// caches, so two panels showing the stream list share one request, and a
/// mutation made from one panel is visible to all of them after its
/// invalidation.
#[derive(Clone)]
pub struct DashboardStore {
    client: MonitorClient,
    config: StoreConfig,
    scheduler: PollingScheduler,
    streams_cache: ResourceCache<Vec<VideoStream>>,
    stream_cache: ResourceCache<VideoStream>,
    status_cache: ResourceCache<SystemStatus>,
    summary_cache: ResourceCache<DashboardSummary>,
    metrics_cache: ResourceCache<Vec<MetricSample>>,
    analytics_cache: ResourceCache<Vec<AnalyticsSample>>,
    events_cache: ResourceCache<Vec<Tagged<StreamEvent>>>,
}

impl DashboardStore {
    /// Create a store with a default client and configuration
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(
            MonitorClient::new()?,
            StoreConfig::default(),
        ))
    }

    /// Create a store around an existing client
    pub fn with_client(client: MonitorClient, config: StoreConfig) -> Self {
        let stale = config.stale_after;
        Self {
            client,
            config,
            scheduler: PollingScheduler::new(),
            streams_cache: ResourceCache::new("streams", stale),
            stream_cache: ResourceCache::new("stream", stale),
            status_cache: ResourceCache::new("system_status", stale),
            summary_cache: ResourceCache::new("dashboard_summary", stale),
            metrics_cache: ResourceCache::new("system_metrics", stale),
            analytics_cache: ResourceCache::new("stream_analytics", stale),
            events_cache: ResourceCache::new("events", stale),
        }
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &MonitorClient {
        &self.client
    }

    /// Get the store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the polling scheduler
    pub fn scheduler(&self) -> &PollingScheduler {
        &self.scheduler
    }

    // ========================================================================
    // Read-through accessors
    // ========================================================================

    /// Registered streams with the manager's live running state overlaid
    ///
    /// The overlay comes from the cached system status; when the status
    /// fetch fails the rows are returned with `is_running` left false.
    pub async fn streams(&self) -> Result<Vec<VideoStream>> {
        let mut rows = self.stream_rows().await?;
        match self.system_status().await {
            Ok(status) => merge_running_state(&mut rows, &status.stream_manager),
            Err(e) => {
                tracing::debug!(error = %e, "running-state overlay skipped");
            }
        }
        Ok(rows)
    }

    /// A single stream by id
    pub async fn stream(&self, stream_id: i64) -> Result<VideoStream> {
        let client = self.client.clone();
        let row = self
            .stream_cache
            .resolve(&stream_key(stream_id), move || {
                let client = client.clone();
                async move { client.stream(stream_id).await }
            })
            .await?;
        Ok(row)
    }

    /// Live system status, including the stream manager's state
    pub async fn system_status(&self) -> Result<SystemStatus> {
        let client = self.client.clone();
        let status = self
            .status_cache
            .resolve(&status_key(), move || {
                let client = client.clone();
                async move { client.system_status().await }
            })
            .await?;
        Ok(status)
    }

    /// Host metrics over the last `hours` hours, ordered oldest-first
    pub async fn system_metrics(&self, hours: u32) -> Result<Vec<MetricSample>> {
        let client = self.client.clone();
        let samples = self
            .metrics_cache
            .resolve(&metrics_key(hours), move || {
                let client = client.clone();
                async move {
                    let mut samples = client.system_metrics(hours).await?;
                    normalize_chronological(&mut samples);
                    Ok::<_, crate::error::Error>(samples)
                }
            })
            .await?;
        Ok(samples)
    }

    /// Headline counters for the dashboard landing view
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let client = self.client.clone();
        let summary = self
            .summary_cache
            .resolve(&summary_key(), move || {
                let client = client.clone();
                async move { client.dashboard_summary().await }
            })
            .await?;
        Ok(summary)
    }

    /// Analytics samples for one stream, ordered oldest-first
    pub async fn stream_analytics(
        &self,
        stream_id: i64,
        hours: u32,
    ) -> Result<Vec<AnalyticsSample>> {
        let client = self.client.clone();
        let samples = self
            .analytics_cache
            .resolve(&analytics_key(stream_id, hours), move || {
                let client = client.clone();
                async move {
                    let mut samples = client.stream_analytics(stream_id, hours).await?;
                    normalize_chronological(&mut samples);
                    Ok::<_, crate::error::Error>(samples)
                }
            })
            .await?;
        Ok(samples)
    }

    /// Aggregated event timeline for a filter, newest-first
    ///
    /// Covers every selected stream concurrently; a stream whose fetch
    /// fails contributes nothing and is logged. Failing to load the
    /// stream list fails the whole pass, since there is nothing to fan
    /// out over.
    pub async fn events(&self, filter: &EventFilter) -> Result<Vec<Tagged<StreamEvent>>> {
        let key = filter.query_key();
        let store = self.clone();
        let filter_owned = filter.clone();
        let timeline = self
            .events_cache
            .resolve(&key, move || {
                let store = store.clone();
                let filter = filter_owned.clone();
                async move { store.fetch_events(&filter).await }
            })
            .await?;
        Ok(timeline)
    }

    /// The dashboard's recent-events pass
    ///
    /// All streams, the configured default event-type filter, 24 hour
    /// window, capped at [`RECENT_EVENTS_CAP`] entries.
    pub async fn recent_events(&self) -> Result<Vec<Tagged<StreamEvent>>> {
        let mut timeline = self.events(&self.recent_events_filter()).await?;
        timeline.truncate(RECENT_EVENTS_CAP);
        Ok(timeline)
    }

    /// Filter used by [`recent_events`](Self::recent_events)
    pub fn recent_events_filter(&self) -> EventFilter {
        let mut filter = EventFilter::new();
        if let Some(event_type) = &self.config.default_event_type {
            filter = filter.event_type(event_type.clone());
        }
        filter
    }

    /// Stream rows without the running-state overlay
    async fn stream_rows(&self) -> Result<Vec<VideoStream>> {
        let client = self.client.clone();
        let rows = self
            .streams_cache
            .resolve(&streams_key(), move || {
                let client = client.clone();
                async move { client.streams().await }
            })
            .await?;
        Ok(rows)
    }

    /// One aggregation pass: fan out over the selected streams and merge
    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<Tagged<StreamEvent>>> {
        let streams = match filter.stream {
            StreamSelector::All => self.stream_rows().await?,
            StreamSelector::One(stream_id) => vec![self.stream(stream_id).await?],
        };

        let hours = filter.hours;
        let event_type: Option<String> = filter.event_type_param().map(str::to_string);
        let client = self.client.clone();
        let branches = fan_out(&streams, move |stream| {
            let client = client.clone();
            let event_type = event_type.clone();
            async move {
                client
                    .stream_events(stream.stream_id, event_type.as_deref(), hours)
                    .await
            }
        })
        .await;

        Ok(merge_branches(branches, None))
    }

    // ========================================================================
    // Non-blocking snapshots
    // ========================================================================

    /// Snapshot of the stream list (rows without the running overlay)
    pub fn peek_streams(&self) -> Snapshot<Vec<VideoStream>> {
        self.streams_cache.read(&streams_key())
    }

    /// Snapshot of one stream
    pub fn peek_stream(&self, stream_id: i64) -> Snapshot<VideoStream> {
        self.stream_cache.read(&stream_key(stream_id))
    }

    /// Snapshot of the system status
    pub fn peek_system_status(&self) -> Snapshot<SystemStatus> {
        self.status_cache.read(&status_key())
    }

    /// Snapshot of the dashboard summary
    pub fn peek_summary(&self) -> Snapshot<DashboardSummary> {
        self.summary_cache.read(&summary_key())
    }

    /// Snapshot of the host metrics for a window
    pub fn peek_system_metrics(&self, hours: u32) -> Snapshot<Vec<MetricSample>> {
        self.metrics_cache.read(&metrics_key(hours))
    }

    /// Snapshot of one stream's analytics for a window
    pub fn peek_stream_analytics(
        &self,
        stream_id: i64,
        hours: u32,
    ) -> Snapshot<Vec<AnalyticsSample>> {
        self.analytics_cache.read(&analytics_key(stream_id, hours))
    }

    /// Snapshot of an aggregated event timeline
    pub fn peek_events(&self, filter: &EventFilter) -> Snapshot<Vec<Tagged<StreamEvent>>> {
        self.events_cache.read(&filter.query_key())
    }

    // ========================================================================
    // Polling subscriptions
    // ========================================================================

    /// Keep the stream list fresh; dropping the handle unsubscribes
    pub fn watch_streams(&self) -> PollHandle {
        let store = self.clone();
        self.scheduler
            .subscribe(streams_key(), STREAMS_POLL_INTERVAL, move || {
                let store = store.clone();
                async move {
                    let client = store.client.clone();
                    force_refresh(&store.streams_cache, &streams_key(), || async move {
                        client.streams().await
                    })
                    .await;
                }
            })
    }

    /// Keep the system status fresh
    pub fn watch_system_status(&self) -> PollHandle {
        let store = self.clone();
        self.scheduler
            .subscribe(status_key(), STATUS_POLL_INTERVAL, move || {
                let store = store.clone();
                async move {
                    let client = store.client.clone();
                    force_refresh(&store.status_cache, &status_key(), || async move {
                        client.system_status().await
                    })
                    .await;
                }
            })
    }

    /// Keep the dashboard summary fresh
    pub fn watch_summary(&self) -> PollHandle {
        let store = self.clone();
        self.scheduler
            .subscribe(summary_key(), SUMMARY_POLL_INTERVAL, move || {
                let store = store.clone();
                async move {
                    let client = store.client.clone();
                    force_refresh(&store.summary_cache, &summary_key(), || async move {
                        client.dashboard_summary().await
                    })
                    .await;
                }
            })
    }

    /// Keep the host metrics for a window fresh
    pub fn watch_system_metrics(&self, hours: u32) -> PollHandle {
        let store = self.clone();
        self.scheduler
            .subscribe(metrics_key(hours), DEFAULT_POLL_INTERVAL, move || {
                let store = store.clone();
                async move {
                    let client = store.client.clone();
                    force_refresh(&store.metrics_cache, &metrics_key(hours), || async move {
                        let mut samples = client.system_metrics(hours).await?;
                        normalize_chronological(&mut samples);
                        Ok(samples)
                    })
                    .await;
                }
            })
    }

    /// Keep an aggregated event timeline fresh
    pub fn watch_events(&self, filter: EventFilter) -> PollHandle {
        let key = filter.query_key();
        let store = self.clone();
        self.scheduler
            .subscribe(key.clone(), EVENTS_POLL_INTERVAL, move || {
                let store = store.clone();
                let key = key.clone();
                let filter = filter.clone();
                async move {
                    let pass = store.clone();
                    force_refresh(&store.events_cache, &key, || async move {
                        pass.fetch_events(&filter).await
                    })
                    .await;
                }
            })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Register a new stream
    ///
    /// Validates the payload first; an invalid payload produces no HTTP
    /// traffic. On success the stream list and dashboard summary are
    /// invalidated so the next read reflects the new stream.
    pub async fn create_stream(&self, payload: &NewStream) -> Result<VideoStream> {
        validate_new_stream(payload)?;
        let created = self.client.create_stream(payload).await?;
        tracing::info!(
            stream = %created.stream_name,
            stream_id = created.stream_id,
            "stream created"
        );
        self.streams_cache.invalidate(&streams_key());
        self.summary_cache.invalidate(&summary_key());
        Ok(created)
    }

    /// Start processing a stream
    ///
    /// On success the stream list, system status, and dashboard summary
    /// are invalidated. On failure every cache is left untouched.
    pub async fn start_stream(&self, stream_id: i64) -> Result<Ack> {
        let ack = self.client.start_stream(stream_id).await?;
        tracing::info!(stream_id, "stream started");
        self.streams_cache.invalidate(&streams_key());
        self.status_cache.invalidate(&status_key());
        self.summary_cache.invalidate(&summary_key());
        Ok(ack)
    }

    /// Stop processing a stream
    ///
    /// Invalidates the same resources as [`start_stream`](Self::start_stream).
    pub async fn stop_stream(&self, stream_id: i64) -> Result<Ack> {
        let ack = self.client.stop_stream(stream_id).await?;
        tracing::info!(stream_id, "stream stopped");
        self.streams_cache.invalidate(&streams_key());
        self.status_cache.invalidate(&status_key());
        self.summary_cache.invalidate(&summary_key());
        Ok(ack)
    }

    /// Delete a stream
    ///
    /// On success the stream list and dashboard summary are invalidated,
    /// along with the cached row of the deleted stream itself.
    pub async fn delete_stream(&self, stream_id: i64) -> Result<Ack> {
        let ack = self.client.delete_stream(stream_id).await?;
        tracing::info!(stream_id, "stream deleted");
        self.streams_cache.invalidate(&streams_key());
        self.summary_cache.invalidate(&summary_key());
        self.stream_cache.invalidate(&stream_key(stream_id));
        Ok(ack)
    }

    /// Mark every cached resource stale
    pub fn invalidate_all(&self) {
        self.streams_cache.invalidate_all();
        self.stream_cache.invalidate_all();
        self.status_cache.invalidate_all();
        self.summary_cache.invalidate_all();
        self.metrics_cache.invalidate_all();
        self.analytics_cache.invalidate_all();
        self.events_cache.invalidate_all();
        tracing::debug!("all caches invalidated");
    }
}

impl fmt::Debug for DashboardStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardStore")
            .field("client", &self.client)
            .field("streams", &self.streams_cache.len())
            .field("status", &self.status_cache.len())
            .field("summary", &self.summary_cache.len())
            .field("events", &self.events_cache.len())
            .field("active_polls", &self.scheduler.active_keys().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::StreamKind;
    use crate::mutations::MSG_NAME_REQUIRED;
    use vmoquery::FetchStatus;

    fn test_store() -> DashboardStore {
        let client = MonitorClient::builder()
            .base_url("http://monitor.local:8000")
            .build()
            .unwrap();
        DashboardStore::with_client(client, StoreConfig::default())
    }

    #[test]
    fn test_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(30));
        assert_eq!(config.default_event_type, None);
    }

    #[test]
    fn test_fresh_store_is_idle() {
        let store = test_store();
        let snap = store.peek_streams();
        assert_eq!(snap.status, FetchStatus::Idle);
        assert!(snap.value.is_none());
        assert!(snap.is_stale);
    }

    #[test]
    fn test_recent_events_filter_uses_configured_type() {
        let client = MonitorClient::builder()
            .base_url("http://monitor.local:8000")
            .build()
            .unwrap();
        let store = DashboardStore::with_client(
            client,
            StoreConfig {
                default_event_type: Some("person_detected".to_string()),
                ..StoreConfig::default()
            },
        );
        assert_eq!(
            store.recent_events_filter().query_key().to_string(),
            "events[all, person_detected, 24]"
        );

        let store = test_store();
        assert_eq!(
            store.recent_events_filter().query_key().to_string(),
            "events[all, all, 24]"
        );
    }

    #[tokio::test]
    async fn test_invalid_payload_short_circuits() {
        // The base URL points nowhere; validation must fail before any
        // request is attempted.
        let store = test_store();
        let err = store
            .create_stream(&NewStream::new("", "rtsp://cam/1", StreamKind::Rtsp))
            .await
            .unwrap_err();
        match err {
            Error::Validation(errors) => {
                assert_eq!(errors.name.as_deref(), Some(MSG_NAME_REQUIRED));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        // Nothing was cached or marked in-flight by the attempt
        assert!(!store.peek_streams().is_fetching);
    }
}
