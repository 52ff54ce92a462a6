//! Distances, distance formatting and departure display helpers.

use std::fmt;

use chrono::{Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::domain::{Stop, UnixTime};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

const FEET_PER_METER: f64 = 3.28084;
const YARDS_PER_METER: f64 = 1.09361;

/// Straight-line to walking distance factor (street grid, traffic lights).
const WALK_DETOUR_FACTOR: f64 = 1.35;
/// Normal walking pace in meters per minute.
const NORMAL_PACE: f64 = 70.0;
/// Fast walking pace in meters per minute.
const FAST_PACE: f64 = 100.0;

/// Unit system used for displaying distances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    American,
    British,
}

impl Units {
    /// Parse a unit system name; unknown names fall back to metric.
    pub fn from_name(name: &str) -> Self {
        match name {
            "american" => Units::American,
            "british" => Units::British,
            _ => Units::Metric,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::American => "american",
            Units::British => "british",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Great-circle distance in meters between two points given as
/// (longitude, latitude) in degrees, using the haversine formula.
pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let (x1, y1, x2, y2) = (
        x1.to_radians(),
        y1.to_radians(),
        x2.to_radians(),
        y2.to_radians(),
    );
    let a = ((y2 - y1) / 2.0).sin().powi(2)
        + ((x2 - x1) / 2.0).sin().powi(2) * y1.cos() * y2.cos();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Sort stops by distance from (x, y), nearest first.
pub fn sorted_by_distance(mut stops: Vec<Stop>, x: f64, y: f64) -> Vec<Stop> {
    stops.sort_by(|a, b| {
        distance(a.x, a.y, x, y).total_cmp(&distance(b.x, b.y, x, y))
    });
    stops
}

/// Format `meters` to `n` significant digits in the given unit system.
pub fn format_distance(meters: f64, n: i32, units: Units) -> String {
    match units {
        Units::Metric => format_distance_metric(meters, n),
        Units::American => format_distance_american(FEET_PER_METER * meters, n),
        Units::British => format_distance_british(YARDS_PER_METER * meters, n),
    }
}

/// Format `meters` as meters or kilometers.
pub fn format_distance_metric(meters: f64, n: i32) -> String {
    if meters >= 1000.0 {
        format_rounded(meters / 1000.0, n, "km", false)
    } else {
        format_rounded(meters, n, "m", true)
    }
}

/// Format `feet` as feet or miles.
pub fn format_distance_american(feet: f64, n: i32) -> String {
    if (n > 1 && feet >= 1000.0) || feet >= 5280.0 {
        format_rounded(feet / 5280.0, n, "mi", false)
    } else {
        format_rounded(feet, n, "ft", true)
    }
}

/// Format `yards` as yards or miles.
pub fn format_distance_british(yards: f64, n: i32) -> String {
    if (n > 1 && yards >= 400.0) || yards >= 1760.0 {
        format_rounded(yards / 1760.0, n, "mi", false)
    } else {
        format_rounded(yards, n, "yd", true)
    }
}

/// Round `value` to `n` significant digits and append `unit`.
///
/// Base units never show fractions.
fn format_rounded(value: f64, n: i32, unit: &str, base_unit: bool) -> String {
    let magnitude = value.abs().max(1.0);
    let mut ndigits = n - (magnitude + 1e-6).log10().ceil() as i32;
    if base_unit {
        ndigits = ndigits.min(0);
    }
    let rounded = round_to(value, ndigits);
    let decimals = ndigits.max(0) as usize;
    format!("{rounded:.decimals$} {unit}")
}

/// Round half to even at `ndigits` decimal places (negative rounds to tens,
/// hundreds, ...).
fn round_to(value: f64, ndigits: i32) -> f64 {
    if ndigits >= 0 {
        let factor = 10f64.powi(ndigits);
        (value * factor).round_ties_even() / factor
    } else {
        let factor = 10f64.powi(-ndigits);
        (value / factor).round_ties_even() * factor
    }
}

/// How likely the user is to catch a departure on foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Reachable at a normal walking pace.
    Relaxed,
    /// Reachable at a fast walking pace.
    Hurry,
    /// Likely to be missed.
    AtRisk,
}

impl Urgency {
    /// Display color for the urgency level.
    pub fn color(&self) -> &'static str {
        match self {
            Urgency::Relaxed => "#3890ff",
            Urgency::Hurry => "#fff444",
            Urgency::AtRisk => "#ff4744",
        }
    }
}

/// Classify a departure by straight-line distance to its stop and time left.
pub fn departure_urgency(distance_m: f64, departure: UnixTime, now: UnixTime) -> Urgency {
    let walk = WALK_DETOUR_FACTOR * distance_m;
    let minutes_left = (departure - now) as f64 / 60.0;
    if minutes_left > 3.0 && walk / NORMAL_PACE <= minutes_left {
        return Urgency::Relaxed;
    }
    if minutes_left > 1.0 && walk / FAST_PACE <= minutes_left {
        return Urgency::Hurry;
    }
    Urgency::AtRisk
}

/// Format a departure time for display.
///
/// Departures more than 1.5 minutes in the past render as an empty string.
/// Departures closer than `cutoff_minutes` render as whole minutes left,
/// later ones as a local `H:MM` clock time.
pub fn format_departure_time(departure: UnixTime, cutoff_minutes: i64, now: UnixTime) -> String {
    let minutes_left = (departure - now) as f64 / 60.0;
    if minutes_left < -1.5 {
        return String::new();
    }
    if minutes_left < cutoff_minutes.max(0) as f64 {
        return format!("{} min", minutes_left.floor() as i64);
    }
    match Local.timestamp_opt(departure, 0).single() {
        Some(local) => format!("{}:{:02}", local.hour(), local.minute()),
        None => String::new(),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Distance is symmetric and non-negative.
        #[test]
        fn distance_symmetric(
            x1 in -180.0f64..180.0, y1 in -89.0f64..89.0,
            x2 in -180.0f64..180.0, y2 in -89.0f64..89.0,
        ) {
            let a = distance(x1, y1, x2, y2);
            let b = distance(x2, y2, x1, y1);
            prop_assert!(a >= 0.0);
            prop_assert!((a - b).abs() < 1e-6);
        }

        /// Base units never render a decimal point.
        #[test]
        fn meters_have_no_fraction(meters in 0.0f64..999.0, n in 1i32..4) {
            let text = format_distance_metric(meters, n);
            prop_assert!(text.ends_with(" m"));
            prop_assert!(!text.contains('.'));
        }
    }
}
