#![forbid(unsafe_code)]

pub mod config;
pub mod counters;
pub mod error;
pub mod rate_limit;
pub mod resource;
pub mod server;

pub use config::{load_from_path, Config};
pub use counters::{CounterMode, CounterStore};
pub use error::{RequestError, Result, ServeError};
pub use rate_limit::{Admission, RateLimiter};
pub use resource::{ListingEntry, ListingRenderer, Resolved};
pub use server::{run, ConnectionStats, ServerState};
