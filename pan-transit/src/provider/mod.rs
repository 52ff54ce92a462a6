//! Provider registry and the proxy in front of each backend.
//!
//! A [`Provider`] pairs the attributes read from a provider's JSON file
//! with a [`TransitBackend`] that knows how to talk to the provider's API.
//! The [`ProviderRegistry`] keeps exactly one live `Provider` per id.

mod attributes;
mod backend;
mod error;
mod registry;

pub use attributes::{ProviderAttributes, ProviderInfo};
pub use backend::{BackendError, BackendLoader, TransitBackend};
pub use error::ProviderError;
pub use registry::{Provider, ProviderPaths, ProviderRegistry};

#[cfg(test)]
pub(crate) mod fake;
