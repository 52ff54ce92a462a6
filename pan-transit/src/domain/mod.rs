//! Provider-agnostic transit records.
//!
//! Every backend converts its own response shapes into these types, so the
//! rest of the engine never sees provider-specific data.

mod departure;
mod line;
mod stop;
mod time;

pub use departure::Departure;
pub use line::{Line, LineMatcher};
pub use stop::Stop;
pub use time::{UnixTime, unix_now};
