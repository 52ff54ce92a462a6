//! Transport for London backend.
//!
//! The TfL API answers departure and line queries for one stop at a time,
//! so multi-stop queries fan out and the per-stop batches are merged.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use futures::future::{BoxFuture, try_join_all};
use moka::future::Cache as MokaCache;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::SharedConfig;
use crate::departures::{merge_departures, merge_lines};
use crate::domain::{Departure, Line, Stop};
use crate::provider::{BackendError, TransitBackend};
use crate::transport::HttpClient;

const BASE_URL: &str = "https://api.tfl.gov.uk";

/// Radius in meters for nearby stop queries.
const NEARBY_RADIUS: &str = "500";

const MAX_SEARCH_RESULTS: &str = "50";

/// Stop types rarely change; refetch daily.
const STOP_TYPES_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const BUS_COLOR: &str = "#ed192d";

/// Mode to display color.
fn mode_color(mode: &str) -> &'static str {
    match mode {
        "coach" => "#ff9900",
        "dlr" => "#0fafa9",
        "overground" => "#ef6419",
        "river-bus" | "river-tour" => "#289ee0",
        "tflrail" | "tube" => "#244ba6",
        "tram" => "#59c134",
        _ => BUS_COLOR,
    }
}

/// Modes that color a stop, most significant first.
const MODE_COLOR_ORDER: [&str; 12] = [
    "tube",
    "overground",
    "dlr",
    "tflrail",
    "national-rail",
    "tram",
    "cable-car",
    "river-bus",
    "river-tour",
    "coach",
    "replacement-bus",
    "bus",
];

/// Stop types that are not mass transit.
const IGNORE_STOP_TYPES: [&str; 4] = [
    "CarPickupSetDownArea",
    "NaptanHailAndRideSection",
    "NaptanSharedTaxi",
    "NaptanTaxiRank",
];

/// TfL backend for one provider id.
pub struct Tfl {
    id: String,
    http: HttpClient,
    config: SharedConfig,
    stop_types: MokaCache<(), Arc<Vec<String>>>,
}

impl std::fmt::Debug for Tfl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tfl").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Tfl {
    pub fn new(id: impl Into<String>, http: HttpClient, config: SharedConfig) -> Self {
        let stop_types = MokaCache::builder()
            .time_to_live(STOP_TYPES_TTL)
            .max_capacity(1)
            .build();
        Self {
            id: id.into(),
            http,
            config,
            stop_types,
        }
    }

    /// Credentials from provider options, only when configured.
    fn auth_params(&self) -> Vec<(&'static str, String)> {
        let config = self.config.read();
        ["app_id", "app_key"]
            .into_iter()
            .filter_map(|name| {
                let value = config.provider_option(&self.id, name)?;
                let value = value.as_str()?.trim();
                (!value.is_empty()).then(|| (name, value.to_string()))
            })
            .collect()
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<T, BackendError> {
        let url = endpoint(segments)?;
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.extend(self.auth_params());
        Ok(self.http.get_json(&url, &query).await?)
    }

    async fn stop_departures(&self, stop: &str) -> Result<Vec<Departure>, BackendError> {
        let arrivals: Vec<Arrival> = self.get(&["StopPoint", stop, "Arrivals"], &[]).await?;
        arrivals
            .into_iter()
            .map(|arrival| convert_arrival(stop, arrival))
            .collect()
    }

    async fn stop_lines(&self, stop: &str) -> Result<Vec<Line>, BackendError> {
        let routes: Vec<RouteSection> = self.get(&["StopPoint", stop, "Route"], &[]).await?;
        Ok(routes.into_iter().map(convert_route).collect())
    }

    /// Stop types to query for nearby stops, without non-transit types.
    async fn stop_types(&self) -> Result<Arc<Vec<String>>, BackendError> {
        if let Some(types) = self.stop_types.get(&()).await {
            return Ok(types);
        }
        let all: Vec<String> = self.get(&["StopPoint", "Meta", "StopTypes"], &[]).await?;
        let types = Arc::new(filter_stop_types(all));
        debug!(provider = %self.id, count = types.len(), "Fetched stop types");
        self.stop_types.insert((), Arc::clone(&types)).await;
        Ok(types)
    }
}

impl TransitBackend for Tfl {
    fn find_departures<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Departure>, BackendError>> {
        Box::pin(async move {
            let batches = try_join_all(stops.iter().map(|stop| self.stop_departures(stop))).await?;
            merge_departures(batches, &[]).map_err(|e| BackendError::Parse(e.to_string()))
        })
    }

    fn find_lines<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Line>, BackendError>> {
        Box::pin(async move {
            let batches = try_join_all(stops.iter().map(|stop| self.stop_lines(stop))).await?;
            merge_lines(batches).map_err(|e| BackendError::Parse(e.to_string()))
        })
    }

    fn find_nearby_stops(&self, x: f64, y: f64) -> BoxFuture<'_, Result<Vec<Stop>, BackendError>> {
        Box::pin(async move {
            let types = self.stop_types().await?;
            let params = [
                ("stopTypes", types.join(",")),
                ("radius", NEARBY_RADIUS.to_string()),
                ("useStopPointHierarchy", "true".to_string()),
                ("categories", "none".to_string()),
                ("returnLines", "true".to_string()),
                ("lat", format!("{y:.6}")),
                ("lon", format!("{x:.6}")),
            ];
            let response: StopPointsResponse = self.get(&["StopPoint"], &params).await?;
            response.stop_points.into_iter().map(convert_stop_point).collect()
        })
    }

    fn find_stops<'a>(
        &'a self,
        query: &'a str,
        _x: f64,
        _y: f64,
    ) -> BoxFuture<'a, Result<Vec<Stop>, BackendError>> {
        Box::pin(async move {
            let params = [("maxResults", MAX_SEARCH_RESULTS.to_string())];
            let response: SearchResponse =
                self.get(&["StopPoint", "Search", query], &params).await?;
            Ok(response.matches.into_iter().map(convert_match).collect())
        })
    }

    fn conf_defaults(&self) -> Option<Map<String, Value>> {
        let mut defaults = Map::new();
        defaults.insert("app_id".into(), Value::from(""));
        defaults.insert("app_key".into(), Value::from(""));
        Some(defaults)
    }
}

/// API URL with each segment percent-encoded.
fn endpoint(segments: &[&str]) -> Result<String, BackendError> {
    let mut url = reqwest::Url::parse(BASE_URL).map_err(|e| BackendError::Parse(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| BackendError::Parse(format!("cannot append path to {BASE_URL}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

fn filter_stop_types(types: Vec<String>) -> Vec<String> {
    let mut types: Vec<String> = types
        .into_iter()
        .filter(|t| !IGNORE_STOP_TYPES.contains(&t.as_str()))
        .collect();
    types.sort();
    types.dedup();
    types
}

fn stop_color(modes: &[String]) -> &'static str {
    MODE_COLOR_ORDER
        .iter()
        .find(|mode| modes.iter().any(|m| m == *mode))
        .map_or(BUS_COLOR, |mode| mode_color(mode))
}

/// Parse an ISO 8601 UTC timestamp such as `2024-03-01T12:34:56Z`.
fn parse_time(time: &str) -> Result<i64, BackendError> {
    DateTime::parse_from_rfc3339(time)
        .map(|t| t.timestamp())
        .map_err(|e| BackendError::Parse(format!("bad time {time:?}: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Arrival {
    line_name: String,
    #[serde(default)]
    towards: String,
    expected_arrival: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteSection {
    line_id: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    destination_name: String,
    #[serde(default)]
    naptan_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopPointsResponse {
    #[serde(default)]
    stop_points: Vec<StopPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopPoint {
    id: String,
    common_name: String,
    #[serde(default)]
    modes: Vec<String>,
    #[serde(default)]
    lines: Vec<NamedLine>,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct NamedLine {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<SearchMatch>,
}

#[derive(Debug, Deserialize)]
struct SearchMatch {
    id: String,
    name: String,
    #[serde(default)]
    modes: Vec<String>,
    lat: f64,
    lon: f64,
}

fn convert_arrival(stop: &str, arrival: Arrival) -> Result<Departure, BackendError> {
    let time = parse_time(&arrival.expected_arrival)?;
    Ok(Departure::scheduled(stop, arrival.line_name, arrival.towards, time))
}

fn convert_route(route: RouteSection) -> Line {
    let line =
        Line::new(route.line_id, route.destination_name).with_color(mode_color(&route.mode));
    match route.naptan_id {
        Some(id) => line.with_id(id),
        None => line,
    }
}

fn convert_stop_point(stop: StopPoint) -> Result<Stop, BackendError> {
    let lines = stop
        .lines
        .into_iter()
        .map(|line| Line::new(line.name, ""))
        .collect();
    let lines = merge_lines(vec![lines]).map_err(|e| BackendError::Parse(e.to_string()))?;
    let mut converted = Stop::new(
        stop.id,
        stop.common_name,
        stop.lon,
        stop.lat,
        stop_color(&stop.modes),
    );
    converted.description = stop.modes.join(", ");
    converted.lines = lines;
    Ok(converted)
}

fn convert_match(found: SearchMatch) -> Stop {
    let mut stop = Stop::new(found.id, found.name, found.lon, found.lat, stop_color(&found.modes));
    stop.description = found.modes.join(", ");
    stop
}
