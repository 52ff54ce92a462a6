//! Backend serving canned data from a JSON file.
//!
//! The file holds stops (with the lines serving them) and departures whose
//! times are offsets from the moment of the query, so the data never goes
//! stale:
//!
//! ```json
//! {
//!   "stops": [{"id": "1", "name": "Central", "x": 24.94, "y": 60.17,
//!              "color": "#007ac9", "lines": [{"name": "7", "destination": "Pasila"}]}],
//!   "departures": [{"stop": "1", "line": "7", "destination": "Pasila",
//!                   "offset": 300, "delay": 60}]
//! }
//! ```

use std::path::Path;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::departures::merge_lines;
use crate::domain::{Departure, Line, Stop, unix_now};
use crate::geo;
use crate::persist;
use crate::provider::{BackendError, TransitBackend};

/// Radius in meters for nearby stop queries.
const NEARBY_RADIUS: f64 = 1000.0;

#[derive(Debug, Clone, Deserialize)]
struct FixtureData {
    #[serde(default)]
    stops: Vec<Stop>,
    #[serde(default)]
    departures: Vec<FixtureDeparture>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureDeparture {
    stop: String,
    line: String,
    #[serde(default)]
    destination: String,
    /// Scheduled departure, seconds after the query.
    offset: i64,
    /// Realtime delay in seconds. Departures with a delay are realtime.
    #[serde(default)]
    delay: Option<i64>,
}

/// Backend answering from a fixture file loaded once.
#[derive(Debug, Clone)]
pub struct FixtureBackend {
    data: FixtureData,
}

impl FixtureBackend {
    /// Load fixture data from `path`.
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let data = persist::read_json(path).map_err(|e| BackendError::Data(e.to_string()))?;
        Ok(Self { data })
    }

    fn stops_with_ids<'a>(&'a self, ids: &'a [String]) -> impl Iterator<Item = &'a Stop> {
        self.data.stops.iter().filter(|stop| ids.contains(&stop.id))
    }

    fn departures(&self, stops: &[String]) -> Vec<Departure> {
        let now = unix_now();
        self.data
            .departures
            .iter()
            .filter(|dep| stops.contains(&dep.stop))
            .map(|dep| {
                let stop = self.data.stops.iter().find(|s| s.id == dep.stop);
                let scheduled = now + dep.offset;
                Departure {
                    stop: dep.stop.clone(),
                    line: dep.line.clone(),
                    destination: dep.destination.clone(),
                    scheduled_time: scheduled,
                    time: scheduled + dep.delay.unwrap_or(0),
                    realtime: dep.delay.is_some(),
                    x: stop.map(|s| s.x),
                    y: stop.map(|s| s.y),
                }
            })
            .collect()
    }
}

impl TransitBackend for FixtureBackend {
    fn find_departures<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Departure>, BackendError>> {
        let departures = self.departures(stops);
        Box::pin(async move { Ok(departures) })
    }

    fn find_lines<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Line>, BackendError>> {
        let batches = self.stops_with_ids(stops).map(|stop| stop.lines.clone()).collect();
        let lines = merge_lines(batches).map_err(|e| BackendError::Data(e.to_string()));
        Box::pin(async move { lines })
    }

    fn find_nearby_stops(&self, x: f64, y: f64) -> BoxFuture<'_, Result<Vec<Stop>, BackendError>> {
        let stops = self
            .data
            .stops
            .iter()
            .filter(|stop| geo::distance(x, y, stop.x, stop.y) <= NEARBY_RADIUS)
            .cloned()
            .collect();
        Box::pin(async move { Ok(stops) })
    }

    fn find_stops<'a>(
        &'a self,
        query: &'a str,
        _x: f64,
        _y: f64,
    ) -> BoxFuture<'a, Result<Vec<Stop>, BackendError>> {
        let query = query.to_lowercase();
        let stops = self
            .data
            .stops
            .iter()
            .filter(|stop| stop.name.to_lowercase().contains(&query))
            .cloned()
            .collect();
        Box::pin(async move { Ok(stops) })
    }
}
