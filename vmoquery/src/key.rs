//! Cache keys.
//!
//! A [`QueryKey`] names one cached resource: a static resource name plus the
//! ordered parameters that scope it (stream id, filter, window). Two keys
//! address the same entry exactly when the name and every parameter are
//! equal, so keys can be rebuilt anywhere without sharing instances.

use std::fmt;

/// One parameter of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    /// Textual parameter (filter name, selector, slug)
    Str(String),
    /// Numeric parameter (id, window size)
    Int(i64),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(s) => write!(f, "{s}"),
            KeyPart::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value as i64)
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(value as i64)
    }
}

/// Identifier of one cache entry.
///
/// # Example
///
/// ```
/// use vmoquery::QueryKey;
///
/// let list = QueryKey::new("streams");
/// let filtered = QueryKey::new("stream_events").with(7).with("motion_detected").with(24);
///
/// assert_eq!(list, QueryKey::new("streams"));
/// assert_ne!(filtered, QueryKey::new("stream_events").with(7).with("all").with(24));
/// assert_eq!(filtered.to_string(), "stream_events[7, motion_detected, 24]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: &'static str,
    params: Vec<KeyPart>,
}

impl QueryKey {
    /// Create a key for a resource with no parameters
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    /// Append one parameter to the key
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.params.push(part.into());
        self
    }

    /// Resource name this key belongs to
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Parameters scoping this key
    pub fn params(&self) -> &[KeyPart] {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            return write!(f, "{}", self.resource);
        }
        write!(f, "{}[", self.resource)?;
        for (i, part) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, "]")
    }
}
