//! Error types for the monitoring client

use crate::mutations::ValidationErrors;

/// Result type alias for monitoring client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when using the monitoring client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed (network, TLS, timeout)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// API returned an error status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stream payload rejected before any request was made
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// Cache resolution failed
    #[error("Query failed: {0}")]
    Query(#[from] vmoquery::QueryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map an HTTP status code to a typed error
    ///
    /// 404 carries its own variant because views treat a vanished stream
    /// differently from a failing backend.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            _ => Self::Api { status, message },
        }
    }

    /// Whether this error is a request timeout
    ///
    /// Timeouts are treated like any other network failure; this helper
    /// only exists so callers can word their reporting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Whether this error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error was raised by client-side validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            Error::from_status(404, "Stream not found"),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from_status(500, "boom"),
            Error::Api { status: 500, .. }
        ));
        assert!(matches!(
            Error::from_status(400, "Failed to start stream"),
            Error::Api { status: 400, .. }
        ));
    }

    #[test]
    fn test_predicates() {
        let err = Error::from_status(404, "gone");
        assert!(err.is_not_found());
        assert!(!err.is_timeout());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_display() {
        let err = Error::from_status(500, "Internal Server Error");
        assert_eq!(err.to_string(), "API error (500): Internal Server Error");
    }
}
