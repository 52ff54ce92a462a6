//! Built-in provider backends.
//!
//! - `digitransit`: Finnish Digitransit GraphQL API (HSL, Waltti, whole
//!   Finland), region chosen by provider option.
//! - `tfl`: Transport for London REST API, one request per stop.
//! - `fixture`: canned data from a JSON file next to the attribute file, for
//!   offline use.

mod digitransit;
mod fixture;
mod tfl;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SharedConfig;
use crate::provider::{BackendLoader, ProviderAttributes, ProviderError, TransitBackend};
use crate::transport::HttpClient;

pub use digitransit::Digitransit;
pub use fixture::FixtureBackend;
pub use tfl::Tfl;

/// Loader for the backends compiled into this crate.
///
/// All network backends share one HTTP client.
#[derive(Debug, Clone)]
pub struct BuiltinBackends {
    http: HttpClient,
    config: SharedConfig,
}

impl BuiltinBackends {
    pub fn new(http: HttpClient, config: SharedConfig) -> Self {
        Self { http, config }
    }
}

impl BackendLoader for BuiltinBackends {
    fn load(
        &self,
        id: &str,
        attributes: &ProviderAttributes,
        attributes_path: &Path,
    ) -> Result<Arc<dyn TransitBackend>, ProviderError> {
        match attributes.backend_name(id) {
            "digitransit" => Ok(Arc::new(Digitransit::new(
                id,
                self.http.clone(),
                self.config.clone(),
            ))),
            "tfl" => Ok(Arc::new(Tfl::new(id, self.http.clone(), self.config.clone()))),
            "fixture" => FixtureBackend::load(&fixture_path(attributes_path))
                .map(|backend| Arc::new(backend) as Arc<dyn TransitBackend>)
                .map_err(|source| ProviderError::Backend {
                    id: id.to_string(),
                    source,
                }),
            other => Err(ProviderError::UnknownBackend {
                id: id.to_string(),
                backend: other.to_string(),
            }),
        }
    }
}

/// `providers/<id>.json` → `providers/<id>.fixture.json`.
fn fixture_path(attributes_path: &Path) -> PathBuf {
    attributes_path.with_extension("fixture.json")
}
