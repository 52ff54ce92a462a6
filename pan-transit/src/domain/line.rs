//! Line records and ignore matchers.

use serde::{Deserialize, Serialize};

/// A transit line as seen from one or more stops.
///
/// Two lines with the same `name` are considered duplicates regardless of
/// destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub name: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Line {
    /// Create a line with no color or id.
    pub fn new(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            color: String::new(),
            id: None,
        }
    }

    /// Set the display color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the provider-specific line id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A `(name, destination)` pair a user chose to hide.
///
/// Matching is case-insensitive on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineMatcher {
    pub name: String,
    #[serde(default)]
    pub destination: String,
}

impl LineMatcher {
    pub fn new(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
        }
    }

    /// Whether this matcher hides the given line name and destination.
    pub fn matches(&self, name: &str, destination: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
            && self.destination.to_lowercase() == destination.to_lowercase()
    }
}

impl From<&Line> for LineMatcher {
    fn from(line: &Line) -> Self {
        Self::new(line.name.clone(), line.destination.clone())
    }
}
