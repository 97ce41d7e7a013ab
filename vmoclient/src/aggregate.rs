//! Cross-stream aggregation
//!
//! The dashboard's "recent events" view is not a backend endpoint: the API
//! only serves events per stream. This module fans a query out over every
//! registered stream concurrently, keeps each stream's success or failure
//! as an explicit value, and merges the successful branches into one
//! newest-first timeline. One broken camera never empties the whole view;
//! it just contributes nothing and gets logged.

use std::fmt;
use std::future::Future;

use chrono::NaiveDateTime;
use futures::future::join_all;
use vmoquery::{KeyPart, QueryKey};

use crate::client::MonitorClient;
use crate::models::{AnalyticsSample, MetricSample, StreamEvent, VideoStream};

/// Default look-back window for event and metric queries, in hours
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Maximum events shown in the dashboard's recent-events pass
pub const RECENT_EVENTS_CAP: usize = 10;

// ===== Timestamps and ordering =====

/// Anything carrying an event or sample time
pub trait Timestamped {
    /// The record's time (UTC)
    fn timestamp(&self) -> NaiveDateTime;
}

impl Timestamped for StreamEvent {
    fn timestamp(&self) -> NaiveDateTime {
        self.event_time
    }
}

impl Timestamped for AnalyticsSample {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl Timestamped for MetricSample {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl<T: Timestamped> Timestamped for Tagged<T> {
    fn timestamp(&self) -> NaiveDateTime {
        self.record.timestamp()
    }
}

/// Reorders records oldest-first
///
/// The API returns newest-first; charts plot left to right.
pub fn normalize_chronological<T: Timestamped>(records: &mut [T]) {
    records.sort_by(|a, b| a.timestamp().cmp(&b.timestamp()));
}

// ===== Branches =====

/// A record annotated with the stream it came from
///
/// Per-stream responses do not repeat the stream name, but a merged
/// timeline is useless without it.
#[derive(Debug, Clone)]
pub struct Tagged<T> {
    /// Originating stream id
    pub stream_id: i64,
    /// Originating stream name
    pub stream_name: String,
    /// The record itself
    pub record: T,
}

impl Tagged<StreamEvent> {
    /// Best available thumbnail for this event
    ///
    /// Prefers the recorded detection clip over the still frame; `None`
    /// when the event captured neither.
    pub fn thumbnail_url(&self, client: &MonitorClient) -> Option<String> {
        if let Some(clip) = self.record.clip_path.as_deref() {
            return Some(client.clip_url(clip));
        }
        self.record.frame_path.as_deref().map(|p| client.frame_url(p))
    }
}

/// What one stream contributed to an aggregation pass
#[derive(Debug, Clone)]
pub enum BranchOutcome<T> {
    /// The stream's records, possibly empty
    Fetched(Vec<T>),
    /// The fetch failed; the message is kept for logging and display
    Failed(String),
}

/// Per-stream result of an aggregation pass
#[derive(Debug, Clone)]
pub struct StreamBranch<T> {
    /// Stream id the branch queried
    pub stream_id: i64,
    /// Stream name at fan-out time
    pub stream_name: String,
    /// What the branch produced
    pub outcome: BranchOutcome<T>,
}

impl<T> StreamBranch<T> {
    /// Whether this branch failed
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, BranchOutcome::Failed(_))
    }
}

/// Runs `fetch` against every stream concurrently
///
/// Branches come back in the same order as `streams` regardless of which
/// request finishes first, so downstream merging stays deterministic. A
/// failing branch is captured as [`BranchOutcome::Failed`]; this function
/// itself never fails.
pub async fn fan_out<T, E, F, Fut>(
    streams: &[VideoStream],
    fetch: F,
) -> Vec<StreamBranch<T>>
where
    F: Fn(VideoStream) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
    E: fmt::Display,
{
    let branches = streams.iter().map(|stream| {
        let stream_id = stream.stream_id;
        let stream_name = stream.stream_name.clone();
        let fut = fetch(stream.clone());
        async move {
            let outcome = match fut.await {
                Ok(records) => BranchOutcome::Fetched(records),
                Err(e) => BranchOutcome::Failed(e.to_string()),
            };
            StreamBranch {
                stream_id,
                stream_name,
                outcome,
            }
        }
    });
    join_all(branches).await
}

/// Merges branch results into one newest-first timeline
///
/// Failed branches contribute nothing and are logged with the stream that
/// failed. The sort is stable, so records with equal timestamps keep
/// their branch order. `cap` truncates the merged timeline when given.
pub fn merge_branches<T: Timestamped>(
    branches: Vec<StreamBranch<T>>,
    cap: Option<usize>,
) -> Vec<Tagged<T>> {
    let mut merged = Vec::new();
    for branch in branches {
        match branch.outcome {
            BranchOutcome::Fetched(records) => {
                merged.extend(records.into_iter().map(|record| Tagged {
                    stream_id: branch.stream_id,
                    stream_name: branch.stream_name.clone(),
                    record,
                }));
            }
            BranchOutcome::Failed(reason) => {
                tracing::warn!(
                    stream_id = branch.stream_id,
                    stream = %branch.stream_name,
                    %reason,
                    "stream contributed nothing to the aggregation pass"
                );
            }
        }
    }

    merged.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    if let Some(cap) = cap {
        merged.truncate(cap);
    }
    merged
}

// ===== Filters =====

/// Which streams an aggregation pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    /// Every registered stream
    All,
    /// A single stream
    One(i64),
}

/// Which event types an aggregation pass keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTypeFilter {
    /// Every event type
    All,
    /// Only events of this type (server-side filter)
    Only(String),
}

/// Parameters of an aggregated event query
///
/// Every component participates in the cache key, so two passes with
/// different windows or type filters never shadow each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Streams to cover
    pub stream: StreamSelector,
    /// Event types to keep
    pub event_type: EventTypeFilter,
    /// Look-back window in hours
    pub hours: u32,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            stream: StreamSelector::All,
            event_type: EventTypeFilter::All,
            hours: DEFAULT_WINDOW_HOURS,
        }
    }
}

impl EventFilter {
    /// Filter covering all streams and types over the default window
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the pass to one stream
    pub fn stream(mut self, stream_id: i64) -> Self {
        self.stream = StreamSelector::One(stream_id);
        self
    }

    /// Keep only events of the given type
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = EventTypeFilter::Only(event_type.into());
        self
    }

    /// Set the look-back window in hours
    pub fn hours(mut self, hours: u32) -> Self {
        self.hours = hours;
        self
    }

    /// Cache key identifying this exact query
    pub fn query_key(&self) -> QueryKey {
        let stream: KeyPart = match self.stream {
            StreamSelector::All => "all".into(),
            StreamSelector::One(id) => id.into(),
        };
        let event_type: KeyPart = match &self.event_type {
            EventTypeFilter::All => "all".into(),
            EventTypeFilter::Only(t) => t.clone().into(),
        };
        QueryKey::new("events")
            .with(stream)
            .with(event_type)
            .with(self.hours)
    }

    /// Value of the `event_type` query parameter, when one applies
    pub(crate) fn event_type_param(&self) -> Option<&str> {
        match &self.event_type {
            EventTypeFilter::All => None,
            EventTypeFilter::Only(t) => Some(t.as_str()),
        }
    }
}
