//! Data structures for the video monitoring API
//!
//! Field names match the backend's JSON exactly. Timestamps are
//! `NaiveDateTime` because the backend serializes naive UTC datetimes
//! without an offset suffix.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ===== Streams =====

/// Transport type of a monitored stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// RTSP camera feed
    Rtsp,
    /// Direct HTTP stream (HLS, MJPEG, ...)
    Http,
    /// Local capture device
    Webcam,
    /// Video file on disk or at a URL
    File,
}

impl StreamKind {
    /// Returns the wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rtsp => "rtsp",
            Self::Http => "http",
            Self::Webcam => "webcam",
            Self::File => "file",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rtsp" => Ok(Self::Rtsp),
            "http" => Ok(Self::Http),
            "webcam" => Ok(Self::Webcam),
            "file" => Ok(Self::File),
            other => Err(Error::other(format!("unknown stream type: {other}"))),
        }
    }
}

impl Default for StreamKind {
    fn default() -> Self {
        StreamKind::Rtsp
    }
}

/// A registered video stream as stored by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStream {
    /// Unique stream identifier
    pub stream_id: i64,
    /// Human-readable name
    pub stream_name: String,
    /// Source URL (camera address, device path, file location)
    pub stream_url: String,
    /// Transport type
    pub stream_type: StreamKind,
    /// Whether the stream is registered as active (soft-delete flag)
    pub is_active: bool,
    /// Whether the stream manager is currently processing this stream.
    /// Absent from the bare REST row; populated by [`merge_running_state`].
    #[serde(default)]
    pub is_running: bool,
    /// Creation time (UTC)
    pub created_at: NaiveDateTime,
    /// Last modification time (UTC)
    pub updated_at: NaiveDateTime,
}

impl VideoStream {
    /// Returns a copy with the running flag set
    pub fn with_running(mut self, running: bool) -> Self {
        self.is_running = running;
        self
    }
}

/// Payload for registering a new stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStream {
    /// Human-readable name
    pub stream_name: String,
    /// Source URL
    pub stream_url: String,
    /// Transport type
    pub stream_type: StreamKind,
}

impl NewStream {
    /// Creates a new stream payload
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        kind: StreamKind,
    ) -> Self {
        Self {
            stream_name: name.into(),
            stream_url: url.into(),
            stream_type: kind,
        }
    }
}

/// Overlays the manager's live running state onto REST stream rows
///
/// The stream manager keys its table by stream id rendered as a string;
/// streams it does not know about keep `is_running = false`.
pub fn merge_running_state(streams: &mut [VideoStream], manager: &ManagerStatus) {
    for stream in streams.iter_mut() {
        stream.is_running = manager
            .streams
            .get(&stream.stream_id.to_string())
            .map(|s| s.running)
            .unwrap_or(false);
    }
}

// ===== Events =====

/// Detection rectangle in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

/// A detection event recorded for a stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Unique event identifier
    pub event_id: i64,
    /// Stream this event belongs to
    pub stream_id: i64,
    /// When the event occurred (UTC)
    pub event_time: NaiveDateTime,
    /// Event kind (`motion_detected`, `object_detected`, `person_detected`, ...)
    pub event_type: String,
    /// Detector confidence, 0.0 to 1.0
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Detection rectangle, when the detector localized the event
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    /// Free-form detector metadata
    #[serde(default)]
    pub event_metadata: Option<serde_json::Value>,
    /// Relative path of the captured frame
    #[serde(default)]
    pub frame_path: Option<String>,
    /// Relative path of a short detection clip, when one was recorded
    #[serde(default)]
    pub clip_path: Option<String>,
}

// ===== Analytics =====

/// A periodic per-stream processing sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSample {
    /// Unique sample identifier
    pub analytics_id: i64,
    /// Stream this sample belongs to
    pub stream_id: i64,
    /// Sample time (UTC)
    pub timestamp: NaiveDateTime,
    /// Frames per second over the sample window
    #[serde(default)]
    pub fps: Option<f64>,
    /// Frames processed in the window
    #[serde(default)]
    pub frame_count: Option<i64>,
    /// Whether motion was detected in the window
    #[serde(default)]
    pub motion_detected: bool,
    /// Objects detected in the window
    #[serde(default)]
    pub object_count: i64,
    /// Frame quality estimate, 0.0 to 1.0
    #[serde(default)]
    pub quality_score: Option<f64>,
    /// Per-frame processing time
    #[serde(default)]
    pub processing_time_ms: Option<i64>,
}

/// Aggregate view over a window of analytics samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsSummary {
    /// Number of samples aggregated
    pub sample_count: usize,
    /// Mean fps over samples that reported one
    pub avg_fps: Option<f64>,
    /// Mean quality score over samples that reported one
    pub avg_quality: Option<f64>,
    /// Mean processing time over samples that reported one
    pub avg_processing_time_ms: Option<f64>,
    /// Total frames processed
    pub total_frames: i64,
    /// Total objects detected
    pub total_objects: i64,
    /// Samples in which motion was detected
    pub motion_samples: usize,
}

impl AnalyticsSummary {
    /// Aggregates a window of samples
    ///
    /// Averages skip samples that did not report the field, so a camera
    /// that never reports quality does not drag the mean to zero.
    pub fn from_samples(samples: &[AnalyticsSample]) -> Self {
        let mut summary = Self {
            sample_count: samples.len(),
            ..Self::default()
        };

        let mut fps_sum = 0.0;
        let mut fps_n = 0usize;
        let mut quality_sum = 0.0;
        let mut quality_n = 0usize;
        let mut time_sum = 0.0;
        let mut time_n = 0usize;

        for sample in samples {
            if let Some(fps) = sample.fps {
                fps_sum += fps;
                fps_n += 1;
            }
            if let Some(quality) = sample.quality_score {
                quality_sum += quality;
                quality_n += 1;
            }
            if let Some(time) = sample.processing_time_ms {
                time_sum += time as f64;
                time_n += 1;
            }
            summary.total_frames += sample.frame_count.unwrap_or(0);
            summary.total_objects += sample.object_count;
            if sample.motion_detected {
                summary.motion_samples += 1;
            }
        }

        summary.avg_fps = (fps_n > 0).then(|| fps_sum / fps_n as f64);
        summary.avg_quality = (quality_n > 0).then(|| quality_sum / quality_n as f64);
        summary.avg_processing_time_ms = (time_n > 0).then(|| time_sum / time_n as f64);
        summary
    }
}

// ===== System =====

/// A host resource usage sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    /// Unique metric identifier
    #[serde(default)]
    pub metric_id: Option<i64>,
    /// Sample time (UTC)
    pub timestamp: NaiveDateTime,
    /// CPU usage percentage
    pub cpu_usage: f64,
    /// Memory usage percentage
    pub memory_usage: f64,
    /// Disk usage percentage
    pub disk_usage: f64,
    /// Network usage, when the collector reports it
    #[serde(default)]
    pub network_usage: Option<f64>,
    /// Streams the manager was running at sample time
    pub active_streams: i64,
}

/// Usage percentage above which a resource is flagged critical
pub const HEALTH_CRITICAL_THRESHOLD: f64 = 80.0;
/// Usage percentage above which a resource is flagged as a warning
pub const HEALTH_WARNING_THRESHOLD: f64 = 60.0;

/// Coarse host health derived from the latest metric sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemHealth {
    /// All resources below the warning threshold
    Good,
    /// At least one resource above the warning threshold
    Warning,
    /// At least one resource above the critical threshold
    Critical,
}

impl SystemHealth {
    /// Classifies a metric sample by its worst resource
    pub fn from_latest(sample: &MetricSample) -> Self {
        let worst = sample
            .cpu_usage
            .max(sample.memory_usage)
            .max(sample.disk_usage);
        if worst > HEALTH_CRITICAL_THRESHOLD {
            Self::Critical
        } else if worst > HEALTH_WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Good
        }
    }

    /// Returns a display label for this health level
    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// A stream as tracked by the stream manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedStream {
    /// Stream name
    pub name: String,
    /// Source URL
    pub url: String,
    /// Whether the manager is currently processing this stream
    pub running: bool,
}

/// Live state of the stream manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStatus {
    /// Streams registered with the manager
    pub active_streams: i64,
    /// Streams currently being processed
    pub running_streams: i64,
    /// Per-stream state, keyed by stream id rendered as a string
    #[serde(default)]
    pub streams: HashMap<String, ManagedStream>,
}

/// Overall system status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Coarse system state reported by the backend (`"running"`)
    pub system_status: String,
    /// Server time of the report (UTC)
    pub timestamp: NaiveDateTime,
    /// Stream manager state
    pub stream_manager: ManagerStatus,
}

/// Headline counters for the dashboard landing view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    /// Streams registered in the database
    pub total_streams: i64,
    /// Streams not soft-deleted
    pub active_streams: i64,
    /// Events recorded in the last 24 hours
    pub recent_events_24h: i64,
    /// Analytics samples recorded in the last hour
    pub recent_analytics_1h: i64,
    /// Server time of the report (UTC)
    pub timestamp: NaiveDateTime,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Reported status (`"healthy"` when all is well)
    pub status: String,
    /// Server time of the check (UTC)
    pub timestamp: NaiveDateTime,
}

impl Health {
    /// Whether the backend reported itself healthy
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Acknowledgement body returned by start/stop/delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    /// Human-readable confirmation
    pub message: String,
}
