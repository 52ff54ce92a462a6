//! Favorites error types.

/// Errors from favorites lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FavoritesError {
    /// No favorite has the given key
    #[error("favorite not found: {0:?}")]
    NotFound(String),
}
