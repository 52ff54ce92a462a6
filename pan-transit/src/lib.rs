//! Public transport favorites and departure aggregation.
//!
//! Stops, lines and departures come from pluggable providers. The user keeps
//! favorites (named groups of stops, possibly near each other) and gets one
//! merged, naturally ordered departure board per favorite.

pub mod app;
pub mod backends;
pub mod config;
pub mod departures;
pub mod domain;
pub mod favorites;
pub mod geo;
pub mod history;
pub mod order;
pub mod persist;
pub mod provider;
pub mod transport;
