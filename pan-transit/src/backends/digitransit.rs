//! Digitransit GraphQL backend.
//!
//! Serves HSL (Helsinki region), Waltti (other Finnish cities) and the
//! national Finland router. The router is the provider option
//! `providers.<id>.region`.

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::SharedConfig;
use crate::domain::{Departure, Line, Stop};
use crate::order;
use crate::provider::{BackendError, TransitBackend};
use crate::transport::HttpClient;

const URL: &str = "https://api.digitransit.fi/routing/v1/routers/{region}/index/graphql";

const DEFAULT_REGION: &str = "hsl";

/// Radius in meters for nearby stop queries.
const NEARBY_RADIUS: u32 = 1000;

/// Departures requested per stop.
const DEPARTURES_PER_STOP: u32 = 20;

/// Route mode to display color.
fn mode_color(mode: &str) -> &'static str {
    match mode {
        "AIRPLANE" => "#ed145d",
        "FERRY" => "#00b9e4",
        "RAIL" => "#8c4799",
        "SUBWAY" => "#ff6319",
        "TRAM" => "#00985f",
        "WALK" => "#888888",
        _ => BUS_COLOR,
    }
}

const BUS_COLOR: &str = "#007ac9";

/// Modes that color a stop, most significant first. Anything else is a bus
/// stop.
const STOP_COLOR_ORDER: [&str; 5] = ["AIRPLANE", "FERRY", "RAIL", "SUBWAY", "TRAM"];

/// Digitransit backend for one provider id.
#[derive(Debug, Clone)]
pub struct Digitransit {
    id: String,
    default_region: String,
    http: HttpClient,
    config: SharedConfig,
}

impl Digitransit {
    /// Create a backend for provider `id`.
    ///
    /// Ids of the form `digitransit_<region>` default to that region,
    /// anything else to HSL.
    pub fn new(id: impl Into<String>, http: HttpClient, config: SharedConfig) -> Self {
        let id = id.into();
        let default_region = id
            .split_once('_')
            .map_or(DEFAULT_REGION, |(_, region)| region)
            .to_string();
        Self {
            id,
            default_region,
            http,
            config,
        }
    }

    fn url(&self) -> String {
        let region = self
            .config
            .read()
            .provider_option(&self.id, "region")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| self.default_region.clone());
        URL.replace("{region}", &region)
    }

    async fn query<T: serde::de::DeserializeOwned>(&self, body: String) -> Result<T, BackendError> {
        let url = self.url();
        let response: GraphQlResponse<T> = self
            .http
            .post_text_json(&url, body, &[("Content-Type", "application/graphql")])
            .await?;
        Ok(response.data)
    }
}

impl TransitBackend for Digitransit {
    fn find_departures<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Departure>, BackendError>> {
        Box::pin(async move {
            let body = format!(
                "{{ stops(ids: [{}]) {{ gtfsId lat lon \
                 stoptimesWithoutPatterns(numberOfDepartures: {n}) {{ \
                 realtime realtimeDeparture scheduledDeparture serviceDay stopHeadsign \
                 trip {{ route {{ shortName }} }} }} }} }}",
                quote_ids(stops),
                n = DEPARTURES_PER_STOP,
            );
            let data: StopsData<DepartureStop> = self.query(body).await?;
            Ok(convert_departures(data))
        })
    }

    fn find_lines<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Line>, BackendError>> {
        Box::pin(async move {
            let body = format!(
                "{{ stops(ids: [{}]) {{ patterns {{ headsign \
                 route {{ gtfsId mode shortName }} }} }} }}",
                quote_ids(stops)
            );
            let data: StopsData<PatternStop> = self.query(body).await?;
            convert_lines(data)
        })
    }

    fn find_nearby_stops(&self, x: f64, y: f64) -> BoxFuture<'_, Result<Vec<Stop>, BackendError>> {
        Box::pin(async move {
            let body = format!(
                "{{ stopsByRadius(lat: {y:.6}, lon: {x:.6}, radius: {radius}) {{ \
                 edges {{ node {{ stop {{ {fields} }} }} }} }} }}",
                radius = NEARBY_RADIUS,
                fields = STOP_FIELDS,
            );
            let data: NearbyData = self.query(body).await?;
            let stops = data
                .stops_by_radius
                .edges
                .into_iter()
                .map(|edge| edge.node.stop);
            stops.map(convert_stop).collect()
        })
    }

    fn find_stops<'a>(
        &'a self,
        query: &'a str,
        _x: f64,
        _y: f64,
    ) -> BoxFuture<'a, Result<Vec<Stop>, BackendError>> {
        Box::pin(async move {
            let query: String = query.chars().filter(|c| !matches!(c, '"' | '{' | '}')).collect();
            let body = format!(
                "{{ stops(name: \"{query}\") {{ {fields} }} }}",
                fields = STOP_FIELDS
            );
            let data: StopsData<ApiStop> = self.query(body).await?;
            data.stops.into_iter().flatten().map(convert_stop).collect()
        })
    }

    fn conf_defaults(&self) -> Option<Map<String, Value>> {
        let mut defaults = Map::new();
        defaults.insert("region".into(), Value::from(self.default_region.as_str()));
        Some(defaults)
    }
}

const STOP_FIELDS: &str =
    "gtfsId name code desc lat lon patterns { headsign route { mode shortName } }";

fn quote_ids(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("\"{}\"", id.replace('"', "")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: T,
}

/// `stops` query result; unknown ids come back as `null`.
#[derive(Debug, Deserialize)]
struct StopsData<S> {
    stops: Vec<Option<S>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyData {
    stops_by_radius: Edges,
}

#[derive(Debug, Deserialize)]
struct Edges {
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct Node {
    stop: ApiStop,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepartureStop {
    gtfs_id: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    stoptimes_without_patterns: Vec<StopTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopTime {
    #[serde(default)]
    realtime: Option<bool>,
    realtime_departure: i64,
    scheduled_departure: i64,
    service_day: i64,
    #[serde(default)]
    stop_headsign: Option<String>,
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    route: Route,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Route {
    #[serde(default)]
    gtfs_id: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pattern {
    #[serde(default)]
    headsign: Option<String>,
    route: Route,
}

#[derive(Debug, Deserialize)]
struct PatternStop {
    #[serde(default)]
    patterns: Vec<Pattern>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiStop {
    gtfs_id: String,
    name: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    lat: f64,
    lon: f64,
    #[serde(default)]
    patterns: Vec<Pattern>,
}

/// Shorten a headsign for display.
///
/// Drops a trailing " via ..." and makes sure an opening parenthesis is
/// preceded by a space.
pub fn parse_headsign(headsign: &str) -> String {
    let headsign = match headsign.find(" via ") {
        Some(i) if i + " via ".len() < headsign.len() => &headsign[..i],
        _ => headsign,
    };
    let mut out = String::with_capacity(headsign.len() + 2);
    let mut prev = None;
    for c in headsign.chars() {
        if c == '(' && prev != Some(' ') {
            out.push(' ');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Stop name with its platform code, e.g. "Kamppi (H1234)".
fn format_stop_name(name: &str, code: Option<&str>) -> String {
    match code {
        Some(code) if !code.is_empty() => format!("{name} ({code})"),
        _ => name.to_string(),
    }
}

fn stop_color(patterns: &[Pattern]) -> &'static str {
    let modes: Vec<&str> = patterns
        .iter()
        .filter_map(|p| p.route.mode.as_deref())
        .collect();
    STOP_COLOR_ORDER
        .iter()
        .find(|mode| modes.contains(*mode))
        .map_or(BUS_COLOR, |mode| mode_color(mode))
}

fn pattern_line(pattern: &Pattern) -> Line {
    Line::new(
        pattern.route.short_name.clone().unwrap_or_default(),
        parse_headsign(pattern.headsign.as_deref().unwrap_or_default()),
    )
}

fn convert_departures(data: StopsData<DepartureStop>) -> Vec<Departure> {
    let mut departures = Vec::new();
    for stop in data.stops.into_iter().flatten() {
        for st in stop.stoptimes_without_patterns {
            departures.push(Departure {
                stop: stop.gtfs_id.clone(),
                line: st.trip.route.short_name.unwrap_or_default(),
                destination: parse_headsign(st.stop_headsign.as_deref().unwrap_or_default()),
                scheduled_time: st.service_day + st.scheduled_departure,
                time: st.service_day + st.realtime_departure,
                realtime: st.realtime.unwrap_or(false),
                x: Some(stop.lon),
                y: Some(stop.lat),
            });
        }
    }
    departures
}

fn convert_lines(data: StopsData<PatternStop>) -> Result<Vec<Line>, BackendError> {
    let lines = data
        .stops
        .into_iter()
        .flatten()
        .flat_map(|stop| stop.patterns)
        .map(|pattern| {
            let color = mode_color(pattern.route.mode.as_deref().unwrap_or_default());
            let line = pattern_line(&pattern).with_color(color);
            match pattern.route.gtfs_id {
                Some(id) => line.with_id(id),
                None => line,
            }
        })
        .collect();
    order::sorted_unique_lines(lines).map_err(|e| BackendError::Parse(e.to_string()))
}

fn convert_stop(stop: ApiStop) -> Result<Stop, BackendError> {
    let lines = stop.patterns.iter().map(pattern_line).collect();
    let lines = order::sorted_unique_lines(lines).map_err(|e| BackendError::Parse(e.to_string()))?;
    let mut converted = Stop::new(
        stop.gtfs_id,
        format_stop_name(&stop.name, stop.code.as_deref()),
        stop.lon,
        stop.lat,
        stop_color(&stop.patterns),
    );
    converted.description = stop.desc.unwrap_or_default();
    converted.lines = lines;
    Ok(converted)
}
