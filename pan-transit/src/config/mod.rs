//! User configuration.
//!
//! Options live in a nested JSON tree whose shape and leaf types are given by
//! a table of built-in defaults. Providers extend the tree with their own
//! defaults under `providers.<id>` when they are first loaded.

mod coerce;
mod store;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use coerce::{CoerceError, coerce};
pub use store::{ConfigurationStore, PROVIDERS};

/// Cloneable handle to the process-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<ConfigurationStore>>);

impl SharedConfig {
    /// Wrap a store for sharing.
    pub fn new(store: ConfigurationStore) -> Self {
        Self(Arc::new(RwLock::new(store)))
    }

    /// Lock for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, ConfigurationStore> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, ConfigurationStore> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
