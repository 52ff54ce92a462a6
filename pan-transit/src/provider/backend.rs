//! The seam between the engine and provider APIs.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::domain::{Departure, Line, Stop};
use crate::transport::TransportError;

use super::{ProviderAttributes, ProviderError};

/// Errors from a backend query.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Request to the provider's API failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response could not be understood
    #[error("parse error: {0}")]
    Parse(String),

    /// Backend data is missing or inconsistent
    #[error("bad data: {0}")]
    Data(String),
}

/// Queries against one provider's API.
///
/// Results are raw: no sorting by distance and no distance annotation; the
/// [`Provider`](super::Provider) proxy does that.
pub trait TransitBackend: Send + Sync {
    /// Departures from the given stops.
    fn find_departures<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Departure>, BackendError>>;

    /// Lines using the given stops, unique and in natural order.
    fn find_lines<'a>(&'a self, stops: &'a [String])
    -> BoxFuture<'a, Result<Vec<Line>, BackendError>>;

    /// Stops near the given coordinates.
    fn find_nearby_stops(&self, x: f64, y: f64) -> BoxFuture<'_, Result<Vec<Stop>, BackendError>>;

    /// Stops matching `query`, near (x, y) if the API supports that.
    fn find_stops<'a>(
        &'a self,
        query: &'a str,
        x: f64,
        y: f64,
    ) -> BoxFuture<'a, Result<Vec<Stop>, BackendError>>;

    /// Provider-specific configuration options and their defaults.
    fn conf_defaults(&self) -> Option<Map<String, Value>> {
        None
    }
}

/// Constructs backends for providers.
pub trait BackendLoader: Send + Sync {
    /// Build the backend for provider `id`, whose attributes were read from
    /// `attributes_path`.
    fn load(
        &self,
        id: &str,
        attributes: &ProviderAttributes,
        attributes_path: &Path,
    ) -> Result<Arc<dyn TransitBackend>, ProviderError>;
}
