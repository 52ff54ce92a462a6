//! Departure records.

use serde::{Deserialize, Serialize};

use super::UnixTime;

/// A single departure of a line from a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    /// Id of the stop the departure leaves from.
    pub stop: String,
    pub line: String,
    pub destination: String,
    pub scheduled_time: UnixTime,
    /// Best known estimate: realtime if available, otherwise scheduled.
    pub time: UnixTime,
    pub realtime: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl Departure {
    /// Create a scheduled (non-realtime) departure without coordinates.
    pub fn scheduled(
        stop: impl Into<String>,
        line: impl Into<String>,
        destination: impl Into<String>,
        time: UnixTime,
    ) -> Self {
        Self {
            stop: stop.into(),
            line: line.into(),
            destination: destination.into(),
            scheduled_time: time,
            time,
            realtime: false,
            x: None,
            y: None,
        }
    }

    /// Delay against the schedule in seconds (negative when early).
    pub fn delay(&self) -> i64 {
        self.time - self.scheduled_time
    }
}
