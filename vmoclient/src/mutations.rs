//! Client-side validation for stream mutations
//!
//! Mutations validate their payload before touching the network; a payload
//! that fails here produces no HTTP traffic at all.

use std::fmt;

use crate::models::{NewStream, StreamKind};

/// Message used when the stream name is blank
pub const MSG_NAME_REQUIRED: &str = "Stream name is required";
/// Message used when the stream URL is blank
pub const MSG_URL_REQUIRED: &str = "Stream URL is required";
/// Message used when an RTSP stream URL has the wrong scheme
pub const MSG_RTSP_SCHEME: &str = "RTSP URL must start with rtsp://";
/// Message used when an HTTP stream URL has the wrong scheme
pub const MSG_HTTP_SCHEME: &str = "HTTP URL must start with http:// or https://";

/// Per-field validation failures for a [`NewStream`] payload
///
/// Both fields are checked independently so a form can surface every
/// problem at once instead of one per submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    /// Problem with the stream name, if any
    pub name: Option<String>,
    /// Problem with the stream URL, if any
    pub url: Option<String>,
}

impl ValidationErrors {
    /// Whether no field failed validation
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.url.is_none()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for msg in [&self.name, &self.url].into_iter().flatten() {
            if !first {
                f.write_str("; ")?;
            }
            f.write_str(msg)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validates a new-stream payload
///
/// The URL scheme is only checked once the URL is non-blank, and only for
/// stream types that mandate a scheme (`rtsp` and `http`). Webcam device
/// paths and file locations are accepted as-is.
pub fn validate_new_stream(payload: &NewStream) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if payload.stream_name.trim().is_empty() {
        errors.name = Some(MSG_NAME_REQUIRED.to_string());
    }

    if payload.stream_url.trim().is_empty() {
        errors.url = Some(MSG_URL_REQUIRED.to_string());
    } else if payload.stream_type == StreamKind::Rtsp
        && !payload.stream_url.starts_with("rtsp://")
    {
        errors.url = Some(MSG_RTSP_SCHEME.to_string());
    } else if payload.stream_type == StreamKind::Http
        && !payload.stream_url.starts_with("http")
    {
        errors.url = Some(MSG_HTTP_SCHEME.to_string());
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_payloads() {
        let cases = [
            NewStream::new("Front Door", "rtsp://cam/1", StreamKind::Rtsp),
            NewStream::new("Feed", "http://cam/feed", StreamKind::Http),
            NewStream::new("Feed", "https://cam/feed", StreamKind::Http),
            NewStream::new("Desk", "/dev/video0", StreamKind::Webcam),
            NewStream::new("Archive", "/data/clips/day.mp4", StreamKind::File),
        ];
        for payload in cases {
            assert!(validate_new_stream(&payload).is_ok(), "{payload:?}");
        }
    }

    #[test]
    fn test_blank_fields_collected_together() {
        let errors = validate_new_stream(&NewStream::new("  ", "", StreamKind::Rtsp)).unwrap_err();
        assert_eq!(errors.name.as_deref(), Some(MSG_NAME_REQUIRED));
        assert_eq!(errors.url.as_deref(), Some(MSG_URL_REQUIRED));
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_rtsp_scheme_enforced() {
        let errors =
            validate_new_stream(&NewStream::new("Cam", "http://cam/1", StreamKind::Rtsp))
                .unwrap_err();
        assert_eq!(errors.name, None);
        assert_eq!(errors.url.as_deref(), Some(MSG_RTSP_SCHEME));
    }

    #[test]
    fn test_http_scheme_enforced() {
        let errors =
            validate_new_stream(&NewStream::new("Cam", "rtsp://cam/1", StreamKind::Http))
                .unwrap_err();
        assert_eq!(errors.url.as_deref(), Some(MSG_HTTP_SCHEME));
    }

    #[test]
    fn test_scheme_not_checked_when_url_blank() {
        let errors =
            validate_new_stream(&NewStream::new("Cam", "   ", StreamKind::Rtsp)).unwrap_err();
        assert_eq!(errors.url.as_deref(), Some(MSG_URL_REQUIRED));
    }

    #[test]
    fn test_display_joins_messages() {
        let errors = validate_new_stream(&NewStream::new("", "", StreamKind::File)).unwrap_err();
        assert_eq!(
            errors.to_string(),
            format!("{MSG_NAME_REQUIRED}; {MSG_URL_REQUIRED}")
        );
    }
}
