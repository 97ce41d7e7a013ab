//! Error types for the query cache layer.

use thiserror::Error;

/// Errors surfaced by cache resolution.
///
/// Fetch closures report failures as display strings so the outcome can be
/// cached and handed to every waiter of the same fetch; the originating
/// typed error stays with the crate that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The fetch backing a resolution failed.
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Result type alias for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Create a fetch error from any displayable cause
    pub fn fetch(message: impl Into<String>) -> Self {
        QueryError::Fetch(message.into())
    }
}
