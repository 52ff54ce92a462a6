//! Application shell: wires configuration, providers, favorites and history
//! together and runs user commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::backends::BuiltinBackends;
use crate::config::{ConfigurationStore, SharedConfig};
use crate::domain::{Stop, unix_now};
use crate::favorites::{FavoritesError, FavoritesStore, LineRefresher};
use crate::geo;
use crate::history::History;
use crate::provider::{BackendLoader, Provider, ProviderError, ProviderPaths, ProviderRegistry};
use crate::transport::{HttpClient, HttpClientConfig, TransportError};

const APP_DIR: &str = "pan-transit";

/// How long shutdown waits for background line refreshes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Errors starting or running the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Neither the requested nor the default provider could be loaded
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// HTTP client could not be created
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Favorites(#[from] FavoritesError),

    /// No provider is active
    #[error("no provider loaded")]
    NoProvider,
}

/// Where the application keeps its files.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    /// Configuration, favorites and search history
    pub config_dir: PathBuf,
    /// User provider definitions
    pub data_home: PathBuf,
    /// Bundled provider definitions
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(
        config_dir: impl Into<PathBuf>,
        data_home: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_home: data_home.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Paths from `PAN_CONFIG_DIR`, `PAN_DATA_HOME` and `PAN_DATA_DIR`,
    /// falling back to the XDG base directories and the bundled data.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|value| !value.is_empty());
        let home = var("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        let xdg = |name: &str, fallback: &str| {
            var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join(fallback))
                .join(APP_DIR)
        };

        let config_dir = var("PAN_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| xdg("XDG_CONFIG_HOME", ".config"));
        let data_home = var("PAN_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| xdg("XDG_DATA_HOME", ".local/share"));
        let data_dir = var("PAN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data")));
        Self::new(config_dir, data_home, data_dir)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("pan-transit.json")
    }

    pub fn favorites_file(&self) -> PathBuf {
        self.config_dir.join("favorites.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.config_dir.join("search-history.json")
    }

    pub fn provider_paths(&self) -> ProviderPaths {
        ProviderPaths::new(&self.data_home, &self.data_dir)
    }
}

/// A user command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// List available providers
    Providers,
    /// List favorites of the active provider
    Favorites,
    /// Departures from the stops of a favorite
    Departures { key: String },
    /// Search stops by name
    Stops { query: String },
    /// Stops near a point
    Nearby { x: f64, y: f64 },
}

impl Command {
    /// Parse command-line arguments (without the program name).
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let coordinate = |value: &str| {
            value
                .parse::<f64>()
                .map_err(|_| format!("bad coordinate: {value:?}"))
        };
        match args {
            [cmd] if cmd == "providers" => Ok(Command::Providers),
            [cmd] if cmd == "favorites" => Ok(Command::Favorites),
            [cmd, key] if cmd == "departures" => Ok(Command::Departures { key: key.clone() }),
            [cmd, query @ ..] if cmd == "stops" && !query.is_empty() => Ok(Command::Stops {
                query: query.join(" "),
            }),
            [cmd, x, y] if cmd == "nearby" => Ok(Command::Nearby {
                x: coordinate(x)?,
                y: coordinate(y)?,
            }),
            _ => Err(Self::usage().to_string()),
        }
    }

    pub fn usage() -> &'static str {
        "usage: pan-transit <command>\n\
         \n\
         commands:\n  \
           providers            list available providers\n  \
           favorites            list favorites of the active provider\n  \
           departures <key>     departures from a favorite\n  \
           stops <query>        search stops by name\n  \
           nearby <x> <y>       stops near a longitude/latitude"
    }
}

/// The running application.
pub struct Application {
    paths: AppPaths,
    config: SharedConfig,
    registry: Arc<ProviderRegistry>,
    favorites: FavoritesStore,
    history: History,
    provider: Option<Arc<Provider>>,
    refresher: LineRefresher,
}

impl Application {
    /// Start with the backends built into this crate.
    pub fn with_builtin_backends(
        paths: AppPaths,
        refresher: LineRefresher,
    ) -> Result<Self, AppError> {
        let http = HttpClient::new(HttpClientConfig::new())?;
        let config = SharedConfig::new(load_config(&paths));
        let loader = Arc::new(BuiltinBackends::new(http, config.clone()));
        Self::start(paths, config, loader, refresher)
    }

    /// Start with a custom backend loader.
    pub fn new(
        paths: AppPaths,
        loader: Arc<dyn BackendLoader>,
        refresher: LineRefresher,
    ) -> Result<Self, AppError> {
        let config = SharedConfig::new(load_config(&paths));
        Self::start(paths, config, loader, refresher)
    }

    fn start(
        paths: AppPaths,
        config: SharedConfig,
        loader: Arc<dyn BackendLoader>,
        refresher: LineRefresher,
    ) -> Result<Self, AppError> {
        let registry = Arc::new(ProviderRegistry::new(
            paths.provider_paths(),
            loader,
            config.clone(),
        ));
        let favorites = FavoritesStore::load(
            paths.favorites_file(),
            Arc::clone(&registry),
            config.clone(),
            refresher.clone(),
        );
        let history = History::load(paths.history_file());
        let mut app = Self {
            paths,
            config,
            registry,
            favorites,
            history,
            provider: None,
            refresher,
        };
        let id = app.config.read().provider();
        app.set_provider(&id)?;
        Ok(app)
    }

    /// Switch to provider `id`.
    ///
    /// If loading fails while no provider is active yet, the default provider
    /// is tried instead.
    pub fn set_provider(&mut self, id: &str) -> Result<(), AppError> {
        match self.registry.get_or_create(id) {
            Ok(provider) => {
                info!(provider = %id, "Using provider");
                self.provider = Some(provider);
                self.config.write().set_provider(id);
                Ok(())
            }
            Err(e) => {
                warn!(provider = %id, error = %e, "Failed to load provider");
                if self.provider.is_none() {
                    let default = self.config.read().default_provider();
                    if default != id {
                        return self.set_provider(&default);
                    }
                }
                Err(e.into())
            }
        }
    }

    pub fn provider(&self) -> Option<&Arc<Provider>> {
        self.provider.as_ref()
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    fn active_provider(&self) -> Result<&Arc<Provider>, AppError> {
        self.provider.as_ref().ok_or(AppError::NoProvider)
    }

    /// Stops matching `query` from the active provider. The query is added
    /// to the search history.
    pub async fn find_stops(&mut self, query: &str, x: f64, y: f64) -> Result<Vec<Stop>, AppError> {
        self.history.add(query);
        let provider = Arc::clone(self.active_provider()?);
        Ok(provider.find_stops(query.trim(), x, y).await)
    }

    /// Stops near (x, y) from the active provider.
    pub async fn find_nearby_stops(&self, x: f64, y: f64) -> Result<Vec<Stop>, AppError> {
        Ok(self.active_provider()?.find_nearby_stops(x, y).await)
    }

    /// Run `command` and return the lines to show.
    pub async fn execute(&mut self, command: Command) -> Result<Vec<String>, AppError> {
        match command {
            Command::Providers => Ok(self
                .registry
                .available()
                .into_iter()
                .map(|p| {
                    let mark = if p.active { '*' } else { ' ' };
                    format!("{mark} {:<24} {}  {}", p.id, p.name, p.description)
                })
                .collect()),
            Command::Favorites => Ok(self
                .favorites
                .favorites()
                .into_iter()
                .map(|view| {
                    format!(
                        "{}  {}  [{}]",
                        view.favorite.key, view.favorite.name, view.line_summary
                    )
                })
                .collect()),
            Command::Departures { key } => {
                let departures = self.favorites.find_departures(&key).await?;
                let cutoff = self.config.read().departure_time_cutoff();
                let now = unix_now();
                Ok(departures
                    .iter()
                    .filter_map(|dep| {
                        let time = geo::format_departure_time(dep.time, cutoff, now);
                        if time.is_empty() {
                            return None;
                        }
                        let estimate = if dep.realtime { ' ' } else { '~' };
                        let late = match dep.delay() / 60 {
                            0 => String::new(),
                            minutes => format!("  ({minutes:+} min)"),
                        };
                        Some(format!(
                            "{time:>7}{estimate} {:<6} {}{late}",
                            dep.line, dep.destination
                        ))
                    })
                    .collect())
            }
            Command::Stops { query } => {
                // No position to measure from.
                let mut stops = self.find_stops(&query, 0.0, 0.0).await?;
                for stop in &mut stops {
                    stop.dist = None;
                }
                Ok(stops.iter().map(format_stop).collect())
            }
            Command::Nearby { x, y } => {
                let stops = self.find_nearby_stops(x, y).await?;
                Ok(stops.iter().map(format_stop).collect())
            }
        }
    }

    /// Write configuration, favorites and history, logging failures.
    pub fn save(&self) {
        if let Err(e) = self.config.read().write(&self.paths.config_file()) {
            warn!(error = %e, "Failed to write configuration");
        }
        if let Err(e) = self.favorites.write() {
            warn!(error = %e, "Failed to write favorites");
        }
        if let Err(e) = self.history.write() {
            warn!(error = %e, "Failed to write search history");
        }
    }

    /// Save, giving background refreshes a short grace period to land first.
    pub async fn quit(self) {
        self.quit_within(SHUTDOWN_GRACE).await;
    }

    /// Save after waiting at most `grace` for background refreshes.
    ///
    /// Refreshes still running are abandoned; their favorites keep the
    /// lines they had.
    pub async fn quit_within(self, grace: Duration) {
        if tokio::time::timeout(grace, self.refresher.settle()).await.is_err() {
            info!(grace = ?grace, "Abandoning unfinished line refreshes");
        }
        self.save();
    }
}

fn load_config(paths: &AppPaths) -> ConfigurationStore {
    let mut store = ConfigurationStore::new();
    if let Err(e) = store.read(&paths.config_file()) {
        warn!(error = %e, "Failed to read configuration, using defaults");
    }
    store
}

fn format_stop(stop: &Stop) -> String {
    format!(
        "{:<16} {:<32} {:>8}  {}",
        stop.id,
        stop.name,
        stop.dist.as_deref().unwrap_or_default(),
        stop.line_summary()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Departure;
    use crate::persist;
    use crate::provider::fake::{FakeBackend, FakeLoader, provider_dirs, write_attributes};
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::{TempDir, tempdir};
    use tokio::runtime::Handle;

    struct Fixture {
        paths: AppPaths,
        loader: Arc<FakeLoader>,
        _dirs: (TempDir, TempDir, TempDir),
    }

    impl Fixture {
        /// Fresh directories with `provider` as the configured provider.
        fn new(provider: &str, backend: FakeBackend) -> Self {
            let (user, bundled, _) = provider_dirs();
            let home = tempdir().unwrap();
            let paths = AppPaths::new(home.path(), user.path(), bundled.path());
            persist::write_json(&json!({"provider": provider}), &paths.config_file()).unwrap();
            Self {
                paths,
                loader: Arc::new(FakeLoader::new(backend)),
                _dirs: (user, bundled, home),
            }
        }

        fn start(&self) -> Result<Application, AppError> {
            Application::new(
                self.paths.clone(),
                self.loader.clone(),
                LineRefresher::new(Handle::current()),
            )
        }
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn paths_from_explicit_variables() {
        let env: HashMap<&str, &str> = [
            ("PAN_CONFIG_DIR", "/cfg"),
            ("PAN_DATA_HOME", "/home-data"),
            ("PAN_DATA_DIR", "/bundled"),
        ]
        .into();
        let paths = AppPaths::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(paths, AppPaths::new("/cfg", "/home-data", "/bundled"));
        assert_eq!(paths.favorites_file(), PathBuf::from("/cfg/favorites.json"));
        assert_eq!(paths.history_file(), PathBuf::from("/cfg/search-history.json"));
    }

    #[test]
    fn paths_fall_back_to_xdg_and_home() {
        let env: HashMap<&str, &str> =
            [("HOME", "/home/u"), ("XDG_CONFIG_HOME", "/xdg"), ("PAN_DATA_HOME", "")].into();
        let paths = AppPaths::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(paths.config_dir, PathBuf::from("/xdg/pan-transit"));
        assert_eq!(paths.data_home, PathBuf::from("/home/u/.local/share/pan-transit"));
        assert!(paths.data_dir.ends_with("data"));
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse(&args(&["providers"])), Ok(Command::Providers));
        assert_eq!(
            Command::parse(&args(&["departures", "abc"])),
            Ok(Command::Departures { key: "abc".into() })
        );
        assert_eq!(
            Command::parse(&args(&["stops", "rautatientori", "east"])),
            Ok(Command::Stops { query: "rautatientori east".into() })
        );
        assert_eq!(
            Command::parse(&args(&["nearby", "24.94", "60.17"])),
            Ok(Command::Nearby { x: 24.94, y: 60.17 })
        );
        assert!(Command::parse(&args(&["nearby", "east", "60.17"])).is_err());
        assert!(Command::parse(&args(&["stops"])).is_err());
        assert!(Command::parse(&[]).is_err());
    }

    #[tokio::test]
    async fn starts_with_configured_provider() {
        let f = Fixture::new("another", FakeBackend::default());
        let app = f.start().unwrap();
        assert_eq!(app.provider().unwrap().id, "another");
    }

    #[tokio::test]
    async fn falls_back_to_default_provider_at_startup() {
        let f = Fixture::new("missing", FakeBackend::default());
        write_attributes(
            &f.paths.data_dir,
            "digitransit_hsl",
            json!({"name": "HSL", "backend": "test", "update_interval": 60}),
        );
        let app = f.start().unwrap();
        assert_eq!(app.provider().unwrap().id, "digitransit_hsl");
        assert_eq!(app.config().read().provider(), "digitransit_hsl");
    }

    #[tokio::test]
    async fn fails_when_default_provider_fails_too() {
        let f = Fixture::new("missing", FakeBackend::default());
        let err = f.start().err().unwrap();
        assert!(matches!(err, AppError::Provider(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_switch_keeps_current_provider() {
        let f = Fixture::new("test", FakeBackend::default());
        let mut app = f.start().unwrap();
        assert!(app.set_provider("missing").is_err());
        assert_eq!(app.provider().unwrap().id, "test");
        assert_eq!(app.config().read().provider(), "test");

        app.set_provider("another").unwrap();
        assert_eq!(app.config().read().provider(), "another");
    }

    #[tokio::test]
    async fn providers_command_marks_active() {
        let f = Fixture::new("test", FakeBackend::default());
        let mut app = f.start().unwrap();
        let lines = app.execute(Command::Providers).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.starts_with("* test")));
        assert!(lines.iter().any(|l| l.starts_with("  another")));
    }

    #[tokio::test]
    async fn stop_search_is_remembered() {
        let backend = FakeBackend {
            stops: vec![Stop::new("1", "Kamppi", 24.93, 60.17, "#007ac9")],
            ..Default::default()
        };
        let f = Fixture::new("test", backend);
        let mut app = f.start().unwrap();

        let lines = app
            .execute(Command::Stops { query: " kamppi ".into() })
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Kamppi"));
        assert_eq!(app.history().queries(), ["kamppi"]);

        app.quit().await;
        let history = History::load(f.paths.history_file());
        assert_eq!(history.queries(), ["kamppi"]);
    }

    #[tokio::test]
    async fn departures_of_a_favorite() {
        let now = unix_now();
        let backend = FakeBackend {
            departures: vec![
                Departure::scheduled("1", "58", "Itäkeskus", now + 300),
                Departure::scheduled("1", "7", "Pasila", now - 600),
                Departure {
                    time: now + 720,
                    realtime: true,
                    ..Departure::scheduled("1", "55", "Koskela", now + 600)
                },
            ],
            ..Default::default()
        };
        let f = Fixture::new("test", backend);
        let mut app = f.start().unwrap();
        let key = app.favorites().add("Home");
        app.favorites()
            .add_stop(&key, &Stop::new("1", "Kamppi", 24.93, 60.17, "#007ac9"))
            .unwrap();

        let lines = app.execute(Command::Departures { key }).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("58"));
        assert!(lines[0].contains("Itäkeskus"));
        assert!(lines[0].contains('~'));
        assert!(!lines[0].contains("min)"));
        assert!(lines[1].contains("Koskela"));
        assert!(lines[1].ends_with("(+2 min)"));

        let missing = app.execute(Command::Departures { key: "nope".into() }).await;
        assert!(matches!(missing, Err(AppError::Favorites(_))));
    }

    #[tokio::test]
    async fn quit_does_not_wait_for_stuck_refresh() {
        let backend = FakeBackend {
            gate: Some(Arc::new(tokio::sync::Semaphore::new(0))),
            ..Default::default()
        };
        let f = Fixture::new("test", backend);
        let app = f.start().unwrap();
        let key = app.favorites().add("Home");
        app.favorites()
            .add_stop(&key, &Stop::new("1", "Kamppi", 24.93, 60.17, "#007ac9"))
            .unwrap();

        let quit = app.quit_within(Duration::from_millis(50));
        assert!(tokio::time::timeout(Duration::from_secs(5), quit).await.is_ok());

        // Saved without the lines the stuck refresh never delivered.
        let app = f.start().unwrap();
        let favorite = app.favorites().get(&key).unwrap();
        assert_eq!(favorite.stops.len(), 1);
        assert!(favorite.lines.is_empty());
    }

    #[tokio::test]
    async fn quit_saves_favorites_and_config() {
        let f = Fixture::new("test", FakeBackend::default());
        let mut app = f.start().unwrap();
        app.set_provider("another").unwrap();
        app.favorites().add("Work");
        app.quit().await;

        let app = f.start().unwrap();
        assert_eq!(app.provider().unwrap().id, "another");
        let names: Vec<String> = app
            .favorites()
            .favorites()
            .into_iter()
            .map(|view| view.favorite.name)
            .collect();
        assert_eq!(names, ["Work"]);
    }
}
