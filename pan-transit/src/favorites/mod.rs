//! Named groups of favorite stops.
//!
//! A favorite is bound to the provider that was configured when it was
//! created. Its centroid, dominant color and line summary are derived from
//! its stops; the line list is refreshed from the provider in the
//! background when it is older than a week or the stops change.

mod error;
mod refresh;
mod store;

pub use error::FavoritesError;
pub use refresh::LineRefresher;
pub use store::{Favorite, FavoriteStop, FavoriteView, FavoritesStore, STALE_AFTER};
