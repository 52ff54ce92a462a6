//! Provider attribute files.

use serde::{Deserialize, Serialize};

/// Contents of `providers/<id>.json`.
///
/// Translatable fields may be written with a leading underscore
/// (`"_description"`); both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderAttributes {
    #[serde(alias = "_name")]
    pub name: String,

    #[serde(default, alias = "_description")]
    pub description: String,

    /// Suggested departure refresh interval in seconds.
    pub update_interval: u64,

    /// Backend implementing the provider. Derived from the id when absent.
    #[serde(default)]
    pub backend: Option<String>,
}

impl ProviderAttributes {
    /// Name of the backend for provider `id`.
    ///
    /// An explicit `backend` field wins. Otherwise ids of the form
    /// `<backend>_<variant>` (e.g. `digitransit_hsl`) use the prefix and any
    /// other id is its own backend name.
    pub fn backend_name<'a>(&'a self, id: &'a str) -> &'a str {
        match &self.backend {
            Some(backend) => backend,
            None => id.split_once('_').map_or(id, |(prefix, _)| prefix),
        }
    }
}

/// Listing entry for a provider that can be selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub update_interval: u64,
    /// Whether this is the configured provider.
    pub active: bool,
}
