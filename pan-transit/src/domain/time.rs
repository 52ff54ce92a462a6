//! Unix time helpers.

use chrono::Utc;

/// Seconds since the Unix epoch.
pub type UnixTime = i64;

/// Current Unix time in seconds.
pub fn unix_now() -> UnixTime {
    Utc::now().timestamp()
}
