//! Departure aggregation.
//!
//! Providers return departures and lines in whatever order their API
//! produces. Everything shown to the user goes through here to get one
//! canonical order: by time, then by natural line order.

use tracing::warn;

use crate::domain::{Departure, Line, LineMatcher};
use crate::order;
use crate::provider::Provider;

/// Departures from `stop_ids` with lines matching `ignore` removed, sorted.
///
/// Any failure, including a line name that cannot be ordered, is logged and
/// yields an empty list.
pub async fn find_departures(
    provider: &Provider,
    stop_ids: &[String],
    ignore: &[LineMatcher],
) -> Vec<Departure> {
    if stop_ids.is_empty() {
        return Vec::new();
    }
    let departures = provider.find_departures(stop_ids).await;
    merge_departures(vec![departures], ignore).unwrap_or_else(|e| {
        warn!(provider = %provider.id, error = %e, "Failed to sort departures");
        Vec::new()
    })
}

/// Combine per-stop departure batches into one filtered, sorted list.
pub fn merge_departures(
    batches: Vec<Vec<Departure>>,
    ignore: &[LineMatcher],
) -> Result<Vec<Departure>, order::BadLineName> {
    let departures = batches.into_iter().flatten().collect();
    order::sorted_departures(order::filter_departures(departures, ignore))
}

/// Combine per-stop line batches into one unique, naturally ordered list.
pub fn merge_lines(batches: Vec<Vec<Line>>) -> Result<Vec<Line>, order::BadLineName> {
    order::sorted_unique_lines(batches.into_iter().flatten().collect())
}
