//! Shared HTTP client for provider backends.
//!
//! One pooled `reqwest::Client` is shared by every backend. Requests are
//! limited by a semaphore so a burst of background refreshes cannot flood a
//! provider's API.

mod client;
mod error;

pub use client::{HttpClient, HttpClientConfig};
pub use error::TransportError;
