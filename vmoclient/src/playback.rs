//! Playback source resolution and session state
//!
//! Browsers cannot play RTSP or raw device captures, so each stream type
//! maps to a different playable source: some streams play their own URL
//! directly, the rest go through the backend's HLS or MJPEG endpoints.
//! [`PlaybackSession`] tracks the player state for one stream as media
//! events arrive from the rendering surface; it owns no background tasks.

use std::fmt;

use crate::models::{StreamKind, VideoStream};

/// Resolves the playable source URL for a stream
///
/// - `http` streams play their own URL;
/// - `rtsp` streams play the backend's HLS transcode;
/// - `webcam` streams play the backend's video endpoint;
/// - `file` streams play their own URL when it is already web-reachable,
///   the backend's video endpoint otherwise.
pub fn playback_source(stream: &VideoStream, base_url: &str) -> String {
    match stream.stream_type {
        StreamKind::Http => stream.stream_url.clone(),
        StreamKind::Rtsp => format!(
            "{base_url}/api/streams/{}/hls/playlist.m3u8",
            stream.stream_id
        ),
        StreamKind::Webcam => format!("{base_url}/api/streams/{}/video", stream.stream_id),
        StreamKind::File => {
            if stream.stream_url.starts_with("http") {
                stream.stream_url.clone()
            } else {
                format!("{base_url}/api/streams/{}/video", stream.stream_id)
            }
        }
    }
}

/// Player state for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// The source is being loaded
    Loading,
    /// Media is playing
    Playing,
    /// Media is loaded but paused
    Paused,
    /// Playback failed; leaves only via [`PlaybackSession::retry`] or a
    /// fresh load
    Error(String),
}

impl PlaybackState {
    /// Returns a display label for this state
    pub fn label(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events reported by the media surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The surface started loading a source
    LoadStart,
    /// Enough data arrived to render the first frame
    DataLoaded,
    /// Playback started
    Play,
    /// Playback paused
    Pause,
    /// Loading or playback failed
    Failed(String),
}

/// Playback state machine for one stream
///
/// The session resolves its source once at open and steps its state as
/// the media surface reports events. Data arrival never implies playing;
/// the surface reports `Play` separately when it actually starts.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    stream: VideoStream,
    base_url: String,
    source: String,
    state: PlaybackState,
}

impl PlaybackSession {
    /// Opens a session for a stream, starting in [`PlaybackState::Loading`]
    pub fn open(stream: &VideoStream, base_url: &str) -> Self {
        let source = playback_source(stream, base_url);
        tracing::debug!(
            stream = %stream.stream_name,
            kind = %stream.stream_type,
            %source,
            "opening playback session"
        );
        Self {
            stream: stream.clone(),
            base_url: base_url.to_string(),
            source,
            state: PlaybackState::Loading,
        }
    }

    /// The resolved source URL
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current player state
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Id of the stream being played
    pub fn stream_id(&self) -> i64 {
        self.stream.stream_id
    }

    /// Name of the stream being played
    pub fn stream_name(&self) -> &str {
        &self.stream.stream_name
    }

    /// Whether media is currently playing
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Steps the state machine with an event from the media surface
    ///
    /// In the error state every event except `LoadStart` is ignored; the
    /// surface keeps firing `Pause` and timing events after a failure and
    /// none of them mean recovery.
    pub fn on_media_event(&mut self, event: MediaEvent) {
        if let MediaEvent::Failed(reason) = &event {
            tracing::warn!(
                stream = %self.stream.stream_name,
                %reason,
                "playback error"
            );
        }

        let next = match (&self.state, event) {
            // A fresh load attempt always clears a previous error
            (_, MediaEvent::LoadStart) => PlaybackState::Loading,
            (PlaybackState::Error(_), _) => return,
            (_, MediaEvent::DataLoaded) => PlaybackState::Paused,
            (_, MediaEvent::Play) => PlaybackState::Playing,
            (_, MediaEvent::Pause) => PlaybackState::Paused,
            (_, MediaEvent::Failed(reason)) => PlaybackState::Error(reason),
        };

        if next != self.state {
            tracing::debug!(
                stream = %self.stream.stream_name,
                from = %self.state,
                to = %next,
                "playback state change"
            );
        }
        self.state = next;
    }

    /// Re-resolves the source and returns to [`PlaybackState::Loading`]
    pub fn retry(&mut self) {
        self.source = playback_source(&self.stream, &self.base_url);
        self.state = PlaybackState::Loading;
        tracing::info!(stream = %self.stream.stream_name, "retrying playback");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    const BASE: &str = "http://monitor.local:8000";

    fn stream(id: i64, kind: StreamKind, url: &str) -> VideoStream {
        VideoStream {
            stream_id: id,
            stream_name: format!("Stream {id}"),
            stream_url: url.to_string(),
            stream_type: kind,
            is_active: true,
            is_running: true,
            created_at: NaiveDateTime::parse_from_str("2024-01-15T10:30:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap(),
            updated_at: NaiveDateTime::parse_from_str("2024-01-15T10:30:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap(),
        }
    }

    #[test]
    fn test_source_table() {
        assert_eq!(
            playback_source(&stream(1, StreamKind::Http, "http://cam/feed.m3u8"), BASE),
            "http://cam/feed.m3u8"
        );
        assert_eq!(
            playback_source(&stream(2, StreamKind::Rtsp, "rtsp://cam/1"), BASE),
            "http://monitor.local:8000/api/streams/2/hls/playlist.m3u8"
        );
        assert_eq!(
            playback_source(&stream(3, StreamKind::Webcam, "/dev/video0"), BASE),
            "http://monitor.local:8000/api/streams/3/video"
        );
    }

    #[test]
    fn test_file_source_depends_on_url() {
        assert_eq!(
            playback_source(&stream(4, StreamKind::File, "https://cdn/day.mp4"), BASE),
            "https://cdn/day.mp4"
        );
        assert_eq!(
            playback_source(&stream(4, StreamKind::File, "/data/clips/day.mp4"), BASE),
            "http://monitor.local:8000/api/streams/4/video"
        );
    }

    #[test]
    fn test_session_opens_loading() {
        let session = PlaybackSession::open(&stream(2, StreamKind::Rtsp, "rtsp://cam/1"), BASE);
        assert_eq!(session.state(), &PlaybackState::Loading);
        assert_eq!(
            session.source(),
            "http://monitor.local:8000/api/streams/2/hls/playlist.m3u8"
        );
        assert!(!session.is_playing());
    }

    #[test]
    fn test_normal_playback_sequence() {
        let mut session = PlaybackSession::open(&stream(2, StreamKind::Rtsp, "rtsp://cam/1"), BASE);

        session.on_media_event(MediaEvent::LoadStart);
        assert_eq!(session.state(), &PlaybackState::Loading);

        // Data arrival never implies playing
        session.on_media_event(MediaEvent::DataLoaded);
        assert_eq!(session.state(), &PlaybackState::Paused);

        session.on_media_event(MediaEvent::Play);
        assert!(session.is_playing());

        session.on_media_event(MediaEvent::Pause);
        assert_eq!(session.state(), &PlaybackState::Paused);
    }

    #[test]
    fn test_error_is_terminal_until_retry() {
        let mut session = PlaybackSession::open(&stream(2, StreamKind::Rtsp, "rtsp://cam/1"), BASE);
        session.on_media_event(MediaEvent::DataLoaded);
        session.on_media_event(MediaEvent::Play);

        session.on_media_event(MediaEvent::Failed("decode error".to_string()));
        assert_eq!(
            session.state(),
            &PlaybackState::Error("decode error".to_string())
        );

        // The surface keeps firing events after a failure; none recover
        session.on_media_event(MediaEvent::Play);
        session.on_media_event(MediaEvent::Pause);
        session.on_media_event(MediaEvent::DataLoaded);
        assert_eq!(session.state().label(), "error");

        session.retry();
        assert_eq!(session.state(), &PlaybackState::Loading);
        assert_eq!(
            session.source(),
            "http://monitor.local:8000/api/streams/2/hls/playlist.m3u8"
        );
    }

    #[test]
    fn test_load_start_clears_error() {
        let mut session = PlaybackSession::open(&stream(2, StreamKind::Rtsp, "rtsp://cam/1"), BASE);
        session.on_media_event(MediaEvent::Failed("network".to_string()));
        session.on_media_event(MediaEvent::LoadStart);
        assert_eq!(session.state(), &PlaybackState::Loading);
    }
}
