//! One live provider per id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::SharedConfig;
use crate::domain::{Departure, Line, Stop};
use crate::geo;
use crate::persist;

use super::{BackendLoader, ProviderAttributes, ProviderError, ProviderInfo, TransitBackend};

/// Significant digits of the distance shown next to found stops.
const DISTANCE_DIGITS: i32 = 2;

/// Directories searched for provider attribute files.
///
/// Files are looked up as `<dir>/providers/<id>.json`, user files first.
#[derive(Debug, Clone)]
pub struct ProviderPaths {
    /// User-writable data directory, overrides `bundled_dir`
    pub user_dir: PathBuf,
    /// Data shipped with the program
    pub bundled_dir: PathBuf,
}

impl ProviderPaths {
    pub fn new(user_dir: impl Into<PathBuf>, bundled_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: user_dir.into(),
            bundled_dir: bundled_dir.into(),
        }
    }

    fn dirs(&self) -> [PathBuf; 2] {
        [
            self.user_dir.join("providers"),
            self.bundled_dir.join("providers"),
        ]
    }

    /// Path of the attribute file for `id`, if one exists.
    pub fn attributes_path(&self, id: &str) -> Option<PathBuf> {
        let leaf = format!("{id}.json");
        self.dirs()
            .into_iter()
            .map(|dir| dir.join(&leaf))
            .find(|path| path.is_file())
    }
}

/// Provider ids have no path components.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A provider: attributes plus the backend that answers its queries.
///
/// Every query applies the same failure policy: backend errors are logged
/// and an empty result is returned, so callers never deal with network or
/// parse failures.
pub struct Provider {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Suggested departure refresh interval in seconds.
    pub update_interval: u64,
    path: PathBuf,
    backend: Arc<dyn TransitBackend>,
    config: SharedConfig,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Path of the attribute file this provider was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Departures from `stops`, unsorted.
    pub async fn find_departures(&self, stops: &[String]) -> Vec<Departure> {
        if stops.is_empty() {
            return Vec::new();
        }
        match self.backend.find_departures(stops).await {
            Ok(departures) => departures,
            Err(e) => {
                warn!(provider = %self.id, error = %e, "Failed to find departures");
                Vec::new()
            }
        }
    }

    /// Lines using `stops`.
    pub async fn find_lines(&self, stops: &[String]) -> Vec<Line> {
        if stops.is_empty() {
            return Vec::new();
        }
        match self.backend.find_lines(stops).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(provider = %self.id, error = %e, "Failed to find lines");
                Vec::new()
            }
        }
    }

    /// Stops near (x, y), nearest first, annotated with their distance.
    pub async fn find_nearby_stops(&self, x: f64, y: f64) -> Vec<Stop> {
        match self.backend.find_nearby_stops(x, y).await {
            Ok(stops) => self.annotate_distance(geo::sorted_by_distance(stops, x, y), x, y),
            Err(e) => {
                warn!(provider = %self.id, error = %e, "Failed to find nearby stops");
                Vec::new()
            }
        }
    }

    /// Stops matching `query`, annotated with their distance from (x, y).
    pub async fn find_stops(&self, query: &str, x: f64, y: f64) -> Vec<Stop> {
        if query.is_empty() {
            return Vec::new();
        }
        match self.backend.find_stops(query, x, y).await {
            Ok(stops) => self.annotate_distance(stops, x, y),
            Err(e) => {
                warn!(provider = %self.id, error = %e, "Failed to find stops");
                Vec::new()
            }
        }
    }

    fn annotate_distance(&self, mut stops: Vec<Stop>, x: f64, y: f64) -> Vec<Stop> {
        let units = self.config.read().units();
        for stop in &mut stops {
            let meters = geo::distance(x, y, stop.x, stop.y);
            stop.dist = Some(geo::format_distance(meters, DISTANCE_DIGITS, units));
        }
        stops
    }
}

/// Process-wide map of provider id to its single live instance.
pub struct ProviderRegistry {
    paths: ProviderPaths,
    loader: Arc<dyn BackendLoader>,
    config: SharedConfig,
    providers: Mutex<HashMap<String, Arc<Provider>>>,
}

impl ProviderRegistry {
    pub fn new(paths: ProviderPaths, loader: Arc<dyn BackendLoader>, config: SharedConfig) -> Self {
        Self {
            paths,
            loader,
            config,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this registry registers provider defaults into.
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// The provider for `id`, constructing it on first use.
    ///
    /// Construction runs under the registry lock, so concurrent callers for
    /// the same id all receive the same instance and the backend's
    /// configuration defaults are registered once.
    pub fn get_or_create(&self, id: &str) -> Result<Arc<Provider>, ProviderError> {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = providers.get(id) {
            return Ok(Arc::clone(provider));
        }
        let provider = Arc::new(self.construct(id)?);
        providers.insert(id.to_string(), Arc::clone(&provider));
        info!(provider = %id, name = %provider.name, "Loaded provider");
        Ok(provider)
    }

    /// The provider for `id` if it has already been constructed.
    pub fn get(&self, id: &str) -> Option<Arc<Provider>> {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn construct(&self, id: &str) -> Result<Provider, ProviderError> {
        if !is_valid_id(id) {
            return Err(ProviderError::NotFound(id.to_string()));
        }
        let path = self
            .paths
            .attributes_path(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        let attributes: ProviderAttributes =
            persist::read_json(&path).map_err(|source| ProviderError::Attributes {
                id: id.to_string(),
                source,
            })?;
        debug!(provider = %id, path = %path.display(), "Read provider attributes");

        let backend = self.loader.load(id, &attributes, &path)?;
        if let Some(defaults) = backend.conf_defaults() {
            self.config.write().register_provider(id, defaults);
        }

        Ok(Provider {
            id: id.to_string(),
            name: attributes.name,
            description: attributes.description,
            update_interval: attributes.update_interval,
            path,
            backend,
            config: self.config.clone(),
        })
    }

    /// Every provider with an attribute file, sorted by name.
    ///
    /// User files override bundled files of the same id. Unreadable files
    /// are skipped with a warning.
    pub fn available(&self) -> Vec<ProviderInfo> {
        let active = self.config.read().provider();
        let mut seen = std::collections::HashSet::new();
        let mut providers = Vec::new();
        for dir in self.paths.dirs() {
            for (id, path) in attribute_files(&dir) {
                if !seen.insert(id.clone()) {
                    continue;
                }
                match persist::read_json::<ProviderAttributes>(&path) {
                    Ok(attributes) => providers.push(ProviderInfo {
                        active: id == active,
                        id,
                        name: attributes.name,
                        description: attributes.description,
                        update_interval: attributes.update_interval,
                    }),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping provider"),
                }
            }
        }
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        providers
    }
}

/// `(id, path)` of every `<id>.json` attribute file in `dir`.
///
/// Other JSON files (backend data such as `<id>.fixture.json`) have a dot in
/// the stem and are skipped.
fn attribute_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| {
            let id = path.file_stem()?.to_str()?.to_string();
            is_valid_id(&id).then_some((id, path))
        })
        .collect();
    files.sort();
    files
}
