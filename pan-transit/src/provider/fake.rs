//! In-memory backend for tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use tempfile::{TempDir, tempdir};
use tokio::sync::Semaphore;

use crate::domain::{Departure, Line, Stop};
use crate::persist;

use super::{
    BackendError, BackendLoader, ProviderAttributes, ProviderError, ProviderPaths, TransitBackend,
};

/// Backend with canned answers.
#[derive(Default)]
pub struct FakeBackend {
    pub stops: Vec<Stop>,
    pub lines: Vec<Line>,
    pub departures: Vec<Departure>,
    /// Fail every query.
    pub fail: bool,
    /// When set, `find_lines` waits for a permit before answering.
    pub gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl FakeBackend {
    fn result<T>(&self, value: T) -> Result<T, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(BackendError::Data("offline".into()))
        } else {
            Ok(value)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransitBackend for FakeBackend {
    fn find_departures<'a>(
        &'a self,
        stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Departure>, BackendError>> {
        let departures = self
            .departures
            .iter()
            .filter(|dep| stops.contains(&dep.stop))
            .cloned()
            .collect();
        Box::pin(async move { self.result(departures) })
    }

    fn find_lines<'a>(
        &'a self,
        _stops: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Line>, BackendError>> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await;
            }
            self.result(self.lines.clone())
        })
    }

    fn find_nearby_stops(
        &self,
        _x: f64,
        _y: f64,
    ) -> BoxFuture<'_, Result<Vec<Stop>, BackendError>> {
        Box::pin(async move { self.result(self.stops.clone()) })
    }

    fn find_stops<'a>(
        &'a self,
        query: &'a str,
        _x: f64,
        _y: f64,
    ) -> BoxFuture<'a, Result<Vec<Stop>, BackendError>> {
        let stops = self
            .stops
            .iter()
            .filter(|stop| stop.name.to_lowercase().contains(&query.to_lowercase()))
            .cloned()
            .collect();
        Box::pin(async move { self.result(stops) })
    }

    fn conf_defaults(&self) -> Option<Map<String, Value>> {
        match json!({"type": 1}) {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// Loader handing out one shared [`FakeBackend`] and counting loads.
pub struct FakeLoader {
    pub backend: Arc<FakeBackend>,
    pub loads: AtomicUsize,
}

impl FakeLoader {
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend: Arc::new(backend),
            loads: AtomicUsize::new(0),
        }
    }
}

impl BackendLoader for FakeLoader {
    fn load(
        &self,
        id: &str,
        attributes: &ProviderAttributes,
        _attributes_path: &Path,
    ) -> Result<Arc<dyn TransitBackend>, ProviderError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match attributes.backend_name(id) {
            "test" | "another" => Ok(self.backend.clone()),
            other => Err(ProviderError::UnknownBackend {
                id: id.to_string(),
                backend: other.to_string(),
            }),
        }
    }
}

pub fn write_attributes(dir: &Path, id: &str, attrs: Value) {
    persist::write_json(&attrs, &dir.join("providers").join(format!("{id}.json"))).unwrap();
}

/// User and bundled data directories holding providers `test` and `another`.
///
/// `test` exists in both; the user copy has description "User".
pub fn provider_dirs() -> (TempDir, TempDir, ProviderPaths) {
    let user = tempdir().unwrap();
    let bundled = tempdir().unwrap();
    write_attributes(
        bundled.path(),
        "test",
        json!({"name": "Test", "_description": "Bundled", "update_interval": 60}),
    );
    write_attributes(
        bundled.path(),
        "another",
        json!({"name": "Another", "update_interval": 30}),
    );
    write_attributes(
        user.path(),
        "test",
        json!({"name": "Test", "description": "User", "update_interval": 60}),
    );
    let paths = ProviderPaths::new(user.path(), bundled.path());
    (user, bundled, paths)
}
