//! Provider lookup errors.

use crate::persist::PersistError;

/// Errors resolving a provider by id.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No attribute file exists for the id
    #[error("provider not found: {0}")]
    NotFound(String),

    /// Attribute file exists but cannot be read
    #[error("failed to read attributes of provider {id}: {source}")]
    Attributes { id: String, source: PersistError },

    /// Attribute file names a backend that does not exist
    #[error("provider {id} uses unknown backend {backend:?}")]
    UnknownBackend { id: String, backend: String },

    /// Backend exists but could not be initialized
    #[error("failed to initialize backend of provider {id}: {source}")]
    Backend {
        id: String,
        source: super::BackendError,
    },
}
