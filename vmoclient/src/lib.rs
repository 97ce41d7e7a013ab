//! Video monitoring dashboard client library
//!
//! This crate provides the data layer for a video monitoring dashboard:
//! a typed HTTP client for the backend REST API, per-resource caching
//! with polling, cross-stream event aggregation, and playback source
//! resolution.
//!
//! # Features
//!
//! - **Stream Management**: List, create, start, stop, and delete
//!   monitored streams, with client-side payload validation
//! - **Cached Reads**: Every resource reads through a staleness-tracked
//!   cache ([`vmoquery`]); concurrent reads share one request and stale
//!   responses cannot overwrite newer data
//! - **Polling**: Ref-counted interval subscriptions keep resources
//!   fresh while a view is on screen
//! - **Event Aggregation**: Fan a query out over every stream and merge
//!   the results into one newest-first timeline, keeping per-stream
//!   failures explicit
//! - **Playback**: Resolve the playable source per stream type and track
//!   player state as media events arrive
//!
//! # Example
//!
//! ```no_run
//! use vmoclient::{DashboardStore, NewStream, StreamKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DashboardStore::new()?;
//!
//!     // Poll while the dashboard is visible; dropping unsubscribes
//!     let _streams_poll = store.watch_streams();
//!     let _status_poll = store.watch_system_status();
//!
//!     for stream in store.streams().await? {
//!         println!(
//!             "{} [{}] running={}",
//!             stream.stream_name, stream.stream_type, stream.is_running
//!         );
//!     }
//!
//!     // Register a camera; the stream list refreshes on next read
//!     let created = store
//!         .create_stream(&NewStream::new(
//!             "Front Door",
//!             "rtsp://192.168.1.10:554/stream1",
//!             StreamKind::Rtsp,
//!         ))
//!         .await?;
//!     store.start_stream(created.stream_id).await?;
//!
//!     for event in store.recent_events().await? {
//!         println!("[{}] {}", event.stream_name, event.record.event_type);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backend
//!
//! The expected backend is the monitoring API serving `/streams`,
//! `/system/status`, `/system/metrics`, `/dashboard/summary`, and the
//! per-stream `/events` and `/analytics` endpoints, plus the `/api/...`
//! media routes for HLS playlists, live video, frames, and clips. The
//! base URL defaults to `http://localhost:8000` and can be overridden
//! with the `VMODASH_API_URL` environment variable.

pub mod aggregate;
pub mod client;
pub mod error;
pub mod models;
pub mod mutations;
pub mod playback;
pub mod store;

// Re-exports
pub use aggregate::{
    fan_out, merge_branches, normalize_chronological, BranchOutcome, EventFilter, EventTypeFilter,
    StreamBranch, StreamSelector, Tagged, Timestamped, DEFAULT_WINDOW_HOURS, RECENT_EVENTS_CAP,
};
pub use client::{ClientBuilder, MonitorClient, DEFAULT_BASE_URL, ENV_BASE_URL};
pub use error::{Error, Result};
pub use models::{
    merge_running_state, Ack, AnalyticsSample, AnalyticsSummary, BoundingBox, DashboardSummary,
    Health, ManagedStream, ManagerStatus, MetricSample, NewStream, StreamEvent, StreamKind,
    SystemHealth, SystemStatus, VideoStream,
};
pub use mutations::{validate_new_stream, ValidationErrors};
pub use playback::{playback_source, MediaEvent, PlaybackSession, PlaybackState};
pub use store::{DashboardStore, StoreConfig};
