pub mod auth;
pub mod cli;
pub mod config;
pub mod http;
pub mod json;
pub mod listener;
pub mod pool;
pub mod responder;
pub mod search;
pub mod server;
pub mod shutdown;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, zero if the clock is before it.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
