//! HTTP client for the video monitoring backend
//!
//! This module provides a thin typed client over the backend's REST API:
//! stream management, detection events, analytics, and system monitoring.
//! It performs no caching; the caching and polling layers live in
//! [`DashboardStore`](crate::store::DashboardStore).
//!
//! # Example
//!
//! ```no_run
//! use vmoclient::MonitorClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MonitorClient::new()?;
//!
//!     let health = client.health().await?;
//!     println!("backend: {}", health.status);
//!
//!     for stream in client.streams().await? {
//!         println!("{} ({})", stream.stream_name, stream.stream_type);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use anyhow::anyhow;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::models::{
    Ack, AnalyticsSample, DashboardSummary, Health, MetricSample, NewStream, StreamEvent,
    SystemStatus, VideoStream,
};

/// Default backend base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default timeout for HTTP requests (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Environment variable that overrides the base URL
pub const ENV_BASE_URL: &str = "VMODASH_API_URL";

/// Backend base URL from the environment, or the compiled-in default
fn env_base_url() -> String {
    std::env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

/// Reject base URLs whose scheme cannot carry API requests
///
/// `Url::parse` reads `monitor.local:8000` as scheme `monitor.local`, so
/// a base URL missing its `http://` prefix surfaces here as a bad scheme.
fn check_base_scheme(url: &Url) -> anyhow::Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!(
            "Unsupported base URL scheme '{}' (expected http or https)",
            other
        )),
    }
}

/// FastAPI error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Video monitoring HTTP client
///
/// The client is stateless and cheap to clone; the underlying connection
/// pool is shared between clones. Caching and polling are handled by
/// higher layers.
#[derive(Debug, Clone)]
pub struct MonitorClient {
    pub(crate) client: Client,
    base_url: String,
    timeout: Duration,
}

impl MonitorClient {
    /// Create a new client with default settings
    ///
    /// The base URL is taken from the `VMODASH_API_URL` environment
    /// variable when set, `http://localhost:8000` otherwise.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the internal HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    // ========================================================================
    // Health and system monitoring
    // ========================================================================

    /// Check backend health
    pub async fn health(&self) -> Result<Health> {
        self.get_json("/health").await
    }

    /// Get the live system status, including the stream manager's state
    pub async fn system_status(&self) -> Result<SystemStatus> {
        self.get_json("/system/status").await
    }

    /// Get host resource metrics for the last `hours` hours
    ///
    /// The backend returns samples newest-first, capped at 1000.
    pub async fn system_metrics(&self, hours: u32) -> Result<Vec<MetricSample>> {
        let mut url = Url::parse(&format!("{}/system/metrics", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("hours", &hours.to_string());
        self.get_json_url(url).await
    }

    /// Get headline counters for the dashboard landing view
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        self.get_json("/dashboard/summary").await
    }

    // ========================================================================
    // Stream management
    // ========================================================================

    /// List all registered streams
    pub async fn streams(&self) -> Result<Vec<VideoStream>> {
        self.get_json("/streams").await
    }

    /// Get a single stream by id
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no stream has this id.
    pub async fn stream(&self, stream_id: i64) -> Result<VideoStream> {
        self.get_json(&format!("/streams/{stream_id}")).await
    }

    /// Register a new stream
    ///
    /// The payload is sent as-is; validate it first with
    /// [`validate_new_stream`](crate::mutations::validate_new_stream) to
    /// avoid a round trip for a payload the backend would reject anyway.
    pub async fn create_stream(&self, payload: &NewStream) -> Result<VideoStream> {
        let url = format!("{}/streams", self.base_url);
        tracing::debug!(name = %payload.stream_name, "creating stream");

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Start processing a stream
    pub async fn start_stream(&self, stream_id: i64) -> Result<Ack> {
        self.post_ack(&format!("/streams/{stream_id}/start")).await
    }

    /// Stop processing a stream
    pub async fn stop_stream(&self, stream_id: i64) -> Result<Ack> {
        self.post_ack(&format!("/streams/{stream_id}/stop")).await
    }

    /// Delete a stream
    ///
    /// The backend stops the stream, removes it from the manager, and
    /// soft-deletes the database row.
    pub async fn delete_stream(&self, stream_id: i64) -> Result<Ack> {
        let url = format!("{}/streams/{stream_id}", self.base_url);
        tracing::debug!(stream_id, "deleting stream");

        let response = self.client.delete(url).timeout(self.timeout).send().await?;
        Self::check(response).await
    }

    // ========================================================================
    // Events and analytics
    // ========================================================================

    /// Get detection events for a stream
    ///
    /// # Arguments
    ///
    /// * `stream_id` - Stream to query
    /// * `event_type` - Only return events of this type, when given
    /// * `hours` - Look-back window in hours
    ///
    /// The backend returns events newest-first, capped at 1000.
    pub async fn stream_events(
        &self,
        stream_id: i64,
        event_type: Option<&str>,
        hours: u32,
    ) -> Result<Vec<StreamEvent>> {
        let mut url = Url::parse(&format!("{}/streams/{stream_id}/events", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("hours", &hours.to_string());
        if let Some(event_type) = event_type {
            url.query_pairs_mut().append_pair("event_type", event_type);
        }
        self.get_json_url(url).await
    }

    /// Get analytics samples for a stream over the last `hours` hours
    ///
    /// The backend returns samples newest-first, capped at 1000.
    pub async fn stream_analytics(
        &self,
        stream_id: i64,
        hours: u32,
    ) -> Result<Vec<AnalyticsSample>> {
        let mut url = Url::parse(&format!(
            "{}/streams/{stream_id}/analytics",
            self.base_url
        ))?;
        url.query_pairs_mut()
            .append_pair("hours", &hours.to_string());
        self.get_json_url(url).await
    }

    // ========================================================================
    // Media URLs
    // ========================================================================

    /// URL of the HLS playlist for a stream's live transcode
    pub fn hls_playlist_url(&self, stream_id: i64) -> String {
        format!(
            "{}/api/streams/{stream_id}/hls/playlist.m3u8",
            self.base_url
        )
    }

    /// URL of the backend's live video endpoint for a stream
    pub fn live_video_url(&self, stream_id: i64) -> String {
        format!("{}/api/streams/{stream_id}/video", self.base_url)
    }

    /// URL of a captured event frame
    ///
    /// `frame_path` is the relative path stored on the event.
    pub fn frame_url(&self, frame_path: &str) -> String {
        format!("{}/api/frames/{frame_path}", self.base_url)
    }

    /// URL of a recorded detection clip
    ///
    /// `clip_path` is the relative path stored on the event.
    pub fn clip_url(&self, clip_path: &str) -> String {
        format!("{}/api/clips/{clip_path}", self.base_url)
    }

    /// Resolve the playable source for a stream
    ///
    /// See [`playback_source`](crate::playback::playback_source) for the
    /// per-type resolution rules.
    pub fn playback_source(&self, stream: &VideoStream) -> String {
        crate::playback::playback_source(stream, &self.base_url)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "GET");

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        Self::check(response).await
    }

    async fn get_json_url<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!(%url, "GET");

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        Self::check(response).await
    }

    async fn post_ack(&self, path: &str) -> Result<Ack> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "POST");

        let response = self.client.post(url).timeout(self.timeout).send().await?;
        Self::check(response).await
    }

    /// Deserialize a success body, or map an error status to a typed error
    async fn check<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Error::from_status(
                status.as_u16(),
                Self::error_detail(status, response).await,
            ))
        }
    }

    /// Extract the backend's error message from a failed response
    ///
    /// FastAPI wraps messages as `{"detail": "..."}`; anything else falls
    /// back to the raw body, then to the status line.
    async fn error_detail(status: StatusCode, response: reqwest::Response) -> String {
        let body = response.text().await.unwrap_or_default();
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
            return parsed.detail;
        }
        let trimmed = body.trim();
        if !trimmed.is_empty() {
            trimmed.to_string()
        } else {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        }
    }
}

/// Builder for [`MonitorClient`]
pub struct ClientBuilder {
    client: Option<Client>,
    base_url: String,
    timeout: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: env_base_url(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Fails when the base URL does not parse, when its scheme is not
    /// http or https, or when the HTTP client cannot be constructed.
    pub fn build(self) -> Result<MonitorClient> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)?;
        check_base_scheme(&parsed)?;

        let client = if let Some(client) = self.client {
            client
        } else {
            Client::builder().timeout(self.timeout).build()?
        };

        Ok(MonitorClient {
            client,
            base_url,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> MonitorClient {
        MonitorClient::builder()
            .base_url("http://monitor.local:8000")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = MonitorClient::builder()
            .base_url("http://monitor.local:8000/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://monitor.local:8000");
    }

    #[test]
    fn test_builder_rejects_garbage_url() {
        assert!(MonitorClient::builder().base_url("not a url").build().is_err());
    }

    #[test]
    fn test_builder_rejects_non_http_scheme() {
        // Without a scheme, `Url::parse` reads the host itself as one
        let err = MonitorClient::builder()
            .base_url("monitor.local:8000")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("expected http or https"));

        let err = MonitorClient::builder()
            .base_url("ftp://monitor.local")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_media_urls() {
        let client = test_client();
        assert_eq!(
            client.hls_playlist_url(3),
            "http://monitor.local:8000/api/streams/3/hls/playlist.m3u8"
        );
        assert_eq!(
            client.live_video_url(3),
            "http://monitor.local:8000/api/streams/3/video"
        );
        assert_eq!(
            client.frame_url("frames/3/42.jpg"),
            "http://monitor.local:8000/api/frames/frames/3/42.jpg"
        );
        assert_eq!(
            client.clip_url("clips/3/42.mp4"),
            "http://monitor.local:8000/api/clips/clips/3/42.mp4"
        );
    }

    #[test]
    fn test_playback_source_delegates() {
        let client = test_client();
        let stream: VideoStream = serde_json::from_str(
            r#"{
                "stream_id": 3,
                "stream_name": "Front Door",
                "stream_url": "rtsp://cam/1",
                "stream_type": "rtsp",
                "is_active": true,
                "created_at": "2024-01-15T10:30:00",
                "updated_at": "2024-01-15T10:30:00"
            }"#,
        )
        .unwrap();
        assert_eq!(
            client.playback_source(&stream),
            "http://monitor.local:8000/api/streams/3/hls/playlist.m3u8"
        );
    }

    // Integration tests for the real backend. Run with:
    // cargo test -- --ignored

    #[tokio::test]
    #[ignore = "Integration test - calls real backend API"]
    async fn test_health_live() {
        let client = MonitorClient::new().unwrap();
        let health = client.health().await.unwrap();
        assert!(health.is_healthy());
    }

    #[tokio::test]
    #[ignore = "Integration test - calls real backend API"]
    async fn test_streams_live() {
        let client = MonitorClient::new().unwrap();
        let streams = client.streams().await.unwrap();
        println!("Found {} streams", streams.len());
        for stream in &streams {
            println!("  {} ({})", stream.stream_name, stream.stream_type);
        }
    }

    #[tokio::test]
    #[ignore = "Integration test - calls real backend API"]
    async fn test_system_status_live() {
        let client = MonitorClient::new().unwrap();
        let status = client.system_status().await.unwrap();
        assert_eq!(status.system_status, "running");
    }
}
