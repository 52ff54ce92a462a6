//! Favorites state, derived metadata and persistence.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SharedConfig;
use crate::departures;
use crate::domain::{Departure, Line, LineMatcher, Stop, UnixTime, unix_now};
use crate::order;
use crate::persist::{self, PersistError};
use crate::provider::{Provider, ProviderRegistry};

use super::{FavoritesError, LineRefresher};

/// Age in seconds after which a favorite's lines are refetched.
pub const STALE_AFTER: i64 = 7 * 24 * 60 * 60;

/// `updated` value that forces a refresh.
const NEVER: UnixTime = -1;

fn never() -> UnixTime {
    NEVER
}

/// Snapshot of a stop as stored in a favorite.
///
/// Coordinates may be missing in files written by older versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteStop {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub color: String,
}

impl From<&Stop> for FavoriteStop {
    fn from(stop: &Stop) -> Self {
        Self {
            id: stop.id.clone(),
            name: stop.name.clone(),
            x: Some(stop.x),
            y: Some(stop.y),
            color: stop.color.clone(),
        }
    }
}

/// A named group of stops of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub key: String,
    /// Provider id, fixed at creation.
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub stops: Vec<FavoriteStop>,
    /// Lines hidden from departures and the line list.
    #[serde(default)]
    pub ignore_lines: Vec<LineMatcher>,
    /// Centroid of the stops.
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// Lines using the stops, as of `updated`.
    #[serde(default)]
    pub lines: Vec<Line>,
    /// When `lines` were last refreshed.
    #[serde(default = "never")]
    pub updated: UnixTime,
}

impl Favorite {
    fn new(name: &str, provider: String) -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            provider,
            name: name.trim().to_string(),
            stops: Vec::new(),
            ignore_lines: Vec::new(),
            x: 0.0,
            y: 0.0,
            lines: Vec::new(),
            updated: NEVER,
        }
    }

    /// Keep only the last of stops sharing an id, as `add_stop` would.
    fn dedup_stops(&mut self) {
        let mut seen = std::collections::HashSet::new();
        let mut stops: Vec<FavoriteStop> = std::mem::take(&mut self.stops)
            .into_iter()
            .rev()
            .filter(|stop| seen.insert(stop.id.clone()))
            .collect();
        stops.reverse();
        self.stops = stops;
    }

    fn stop_ids(&self) -> Vec<String> {
        self.sorted_stops().into_iter().map(|stop| stop.id).collect()
    }

    fn sorted_stops(&self) -> Vec<FavoriteStop> {
        let mut stops = self.stops.clone();
        stops.sort_by(|a, b| a.name.cmp(&b.name));
        stops
    }

    /// Set the centroid to the mean of the stops with coordinates.
    fn update_coordinates(&mut self) {
        let located: Vec<(f64, f64)> = self
            .stops
            .iter()
            .filter_map(|stop| Some((stop.x?, stop.y?)))
            .collect();
        if located.is_empty() {
            (self.x, self.y) = (0.0, 0.0);
            return;
        }
        let n = located.len() as f64;
        self.x = located.iter().map(|(x, _)| x).sum::<f64>() / n;
        self.y = located.iter().map(|(_, y)| y).sum::<f64>() / n;
    }

    /// Most common stop color, ties to the smallest.
    fn color(&self) -> Option<String> {
        let colors: Vec<String> = self.stops.iter().map(|stop| stop.color.clone()).collect();
        order::most_common(&colors)
    }

    /// Comma-separated names of the favorite's lines in natural order.
    fn line_summary(&self) -> String {
        let lines: Vec<Line> = self
            .lines
            .iter()
            .map(|line| Line::new(line.name.clone(), ""))
            .collect();
        let lines = order::sorted_unique_lines(lines.clone()).unwrap_or_else(|e| {
            warn!(favorite = %self.key, error = %e, "Cannot sort lines");
            let mut seen = std::collections::HashSet::new();
            lines
                .into_iter()
                .filter(|line| seen.insert(line.name.clone()))
                .collect()
        });
        lines
            .iter()
            .map(|line| line.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A favorite as presented to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FavoriteView {
    #[serde(flatten)]
    pub favorite: Favorite,
    /// Dominant stop color; `None` without stops.
    pub color: Option<String>,
    pub line_summary: String,
}

/// The user's favorites.
///
/// All methods take `&self`; state is shared with background refreshes.
/// Mutations return immediately and never wait for the network.
pub struct FavoritesStore {
    favorites: Arc<Mutex<Vec<Favorite>>>,
    path: PathBuf,
    registry: Arc<ProviderRegistry>,
    config: SharedConfig,
    refresher: LineRefresher,
}

impl FavoritesStore {
    /// Create an empty store persisted at `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ProviderRegistry>,
        config: SharedConfig,
        refresher: LineRefresher,
    ) -> Self {
        Self {
            favorites: Arc::new(Mutex::new(Vec::new())),
            path: path.into(),
            registry,
            config,
            refresher,
        }
    }

    /// Create a store from the favorites file at `path`.
    ///
    /// A missing or unreadable file gives an empty store. Metadata of every
    /// loaded favorite is brought up to date.
    pub fn load(
        path: impl Into<PathBuf>,
        registry: Arc<ProviderRegistry>,
        config: SharedConfig,
        refresher: LineRefresher,
    ) -> Self {
        let store = Self::new(path, registry, config, refresher);
        match persist::read_json::<Vec<Favorite>>(&store.path) {
            Ok(mut favorites) => {
                debug!(count = favorites.len(), "Loaded favorites");
                favorites.iter_mut().for_each(Favorite::dedup_stops);
                *store.lock() = favorites;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(error = %e, "Failed to load favorites"),
        }
        store.update_meta(&[]);
        store
    }

    /// Path of the favorites file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Favorite>> {
        self.favorites.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to favorite `key`.
    fn with<T>(&self, key: &str, f: impl FnOnce(&mut Favorite) -> T) -> Result<T, FavoritesError> {
        let mut favorites = self.lock();
        favorites
            .iter_mut()
            .find(|favorite| favorite.key == key)
            .map(f)
            .ok_or_else(|| FavoritesError::NotFound(key.to_string()))
    }

    /// Add a favorite bound to the configured provider and return its key.
    pub fn add(&self, name: &str) -> String {
        let provider = self.config.read().provider();
        let favorite = Favorite::new(name, provider);
        let key = favorite.key.clone();
        self.lock().push(favorite);
        self.update_meta(&[&key]);
        key
    }

    /// Add `stop` to favorite `key`, replacing a stop with the same id.
    pub fn add_stop(&self, key: &str, stop: &Stop) -> Result<(), FavoritesError> {
        self.with(key, |favorite| {
            favorite.stops.retain(|s| s.id != stop.id);
            favorite.stops.push(FavoriteStop::from(stop));
        })?;
        self.update_meta(&[key]);
        Ok(())
    }

    /// Remove the stop `id` from favorite `key`.
    pub fn remove_stop(&self, key: &str, id: &str) -> Result<(), FavoritesError> {
        self.with(key, |favorite| favorite.stops.retain(|s| s.id != id))?;
        self.update_meta(&[key]);
        Ok(())
    }

    /// Remove favorite `key`. Pending refreshes for it are discarded.
    pub fn remove(&self, key: &str) {
        self.lock().retain(|favorite| favorite.key != key);
    }

    /// Rename favorite `key`.
    pub fn rename(&self, key: &str, name: &str) -> Result<(), FavoritesError> {
        self.with(key, |favorite| favorite.name = name.trim().to_string())
    }

    /// Replace the lines hidden for favorite `key`.
    pub fn set_ignore_lines(
        &self,
        key: &str,
        ignore: Vec<LineMatcher>,
    ) -> Result<(), FavoritesError> {
        self.with(key, |favorite| favorite.ignore_lines = ignore)?;
        self.update_meta(&[key]);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Favorite, FavoritesError> {
        self.with(key, |favorite| favorite.clone())
    }

    pub fn get_name(&self, key: &str) -> Result<String, FavoritesError> {
        self.with(key, |favorite| favorite.name.clone())
    }

    /// Stops of favorite `key`, sorted by name.
    pub fn get_stops(&self, key: &str) -> Result<Vec<FavoriteStop>, FavoritesError> {
        self.with(key, |favorite| favorite.sorted_stops())
    }

    /// Stop ids of favorite `key`, in stop name order.
    pub fn get_stop_ids(&self, key: &str) -> Result<Vec<String>, FavoritesError> {
        self.with(key, |favorite| favorite.stop_ids())
    }

    pub fn get_ignore_lines(&self, key: &str) -> Result<Vec<LineMatcher>, FavoritesError> {
        self.with(key, |favorite| favorite.ignore_lines.clone())
    }

    /// Most common stop color of favorite `key`.
    pub fn get_color(&self, key: &str) -> Result<Option<String>, FavoritesError> {
        self.with(key, |favorite| favorite.color())
    }

    pub fn get_line_summary(&self, key: &str) -> Result<String, FavoritesError> {
        self.with(key, |favorite| favorite.line_summary())
    }

    /// Provider of favorite `key`, or `None` (logged) if it cannot be loaded.
    pub fn get_provider(&self, key: &str) -> Result<Option<Arc<Provider>>, FavoritesError> {
        let id = self.with(key, |favorite| favorite.provider.clone())?;
        Ok(self.resolve_provider(&id))
    }

    fn resolve_provider(&self, id: &str) -> Option<Arc<Provider>> {
        match self.registry.get_or_create(id) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(provider = %id, error = %e, "Failed to load provider");
                None
            }
        }
    }

    /// Favorites of the configured provider, sorted by name.
    pub fn favorites(&self) -> Vec<FavoriteView> {
        let provider = self.config.read().provider();
        let mut views: Vec<FavoriteView> = self
            .lock()
            .iter()
            .filter(|favorite| favorite.provider == provider)
            .map(|favorite| {
                let mut view = FavoriteView {
                    favorite: favorite.clone(),
                    color: favorite.color(),
                    line_summary: favorite.line_summary(),
                };
                view.favorite.stops = favorite.sorted_stops();
                view
            })
            .collect();
        views.sort_by(|a, b| a.favorite.name.cmp(&b.favorite.name));
        views
    }

    /// Departures from the stops of favorite `key`, without ignored lines.
    ///
    /// Gives an empty list if the provider cannot be loaded.
    pub async fn find_departures(&self, key: &str) -> Result<Vec<Departure>, FavoritesError> {
        let Some(provider) = self.get_provider(key)? else {
            return Ok(Vec::new());
        };
        let (stops, ignore) = self.with(key, |favorite| {
            (favorite.stop_ids(), favorite.ignore_lines.clone())
        })?;
        Ok(departures::find_departures(&provider, &stops, &ignore).await)
    }

    /// Write favorites to their file.
    pub fn write(&self) -> Result<(), PersistError> {
        let favorites = self.lock().clone();
        persist::write_json(&favorites, &self.path)
    }

    /// Bring derived metadata up to date, forcing a line refresh for `keys`.
    ///
    /// Every favorite gets its centroid recomputed and its provider loaded
    /// here, on the calling thread. Favorites whose lines are stale get a
    /// background refresh.
    fn update_meta(&self, keys: &[&str]) {
        let now = unix_now();
        let mut jobs = Vec::new();
        {
            let mut favorites = self.lock();
            for favorite in favorites.iter_mut() {
                if keys.contains(&favorite.key.as_str()) {
                    favorite.updated = NEVER;
                }
                favorite.update_coordinates();
                let stale = now - favorite.updated > STALE_AFTER;
                if stale {
                    favorite.updated = now;
                }
                jobs.push((
                    favorite.key.clone(),
                    favorite.provider.clone(),
                    stale.then(|| favorite.stop_ids()),
                ));
            }
        }

        for (key, provider_id, refresh) in jobs {
            let Some(provider) = self.resolve_provider(&provider_id) else {
                continue;
            };
            if let Some(stops) = refresh {
                debug!(favorite = %key, provider = %provider_id, "Scheduling line refresh");
                self.refresher.spawn(refresh_lines(
                    Arc::clone(&self.favorites),
                    key,
                    provider,
                    stops,
                ));
            }
        }
    }
}

/// Fetch lines for `stops` and store them in favorite `key`.
///
/// The result is dropped if the favorite was removed or its stops changed
/// while the query ran; in the latter case a newer refresh is on its way.
async fn refresh_lines(
    favorites: Arc<Mutex<Vec<Favorite>>>,
    key: String,
    provider: Arc<Provider>,
    stops: Vec<String>,
) {
    let lines = provider.find_lines(&stops).await;
    let mut favorites = favorites.lock().unwrap_or_else(PoisonError::into_inner);
    match favorites.iter_mut().find(|favorite| favorite.key == key) {
        Some(favorite) if favorite.stop_ids() == stops => {
            favorite.lines = order::filter_lines(lines, &favorite.ignore_lines);
            debug!(favorite = %key, count = favorite.lines.len(), "Refreshed lines");
        }
        Some(_) => debug!(favorite = %key, "Discarding lines for outdated stops"),
        None => debug!(favorite = %key, "Discarding lines for removed favorite"),
    }
}
