//! Stop records.

use serde::{Deserialize, Serialize};

use super::Line;

/// A stop as returned by a provider.
///
/// `id` is only unique within the namespace of the provider that returned it.
/// `x` is longitude and `y` is latitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub color: String,

    /// Free-form description, e.g. the modes serving the stop.
    #[serde(default)]
    pub description: String,

    /// Lines serving the stop, unique by name and in natural order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<Line>,

    /// Formatted distance from the query point, set by the provider proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<String>,
}

impl Stop {
    /// Create a stop with no description, lines or distance.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        x: f64,
        y: f64,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            x,
            y,
            color: color.into(),
            description: String::new(),
            lines: Vec::new(),
            dist: None,
        }
    }

    /// Comma-separated names of the lines serving this stop.
    pub fn line_summary(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
