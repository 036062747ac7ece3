//! Time utilities and constants.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Default bound on a single engine operation, lock wait included.
    pub fn operation_timeout() -> Duration {
        Duration::from_secs(2)
    }

    /// Default bound on waiting for a pooled connection.
    pub fn acquire_timeout() -> Duration {
        Duration::from_secs(2)
    }

    /// Grace period for in-flight requests on shutdown.
    pub fn shutdown_grace() -> Duration {
        Duration::from_secs(10)
    }
}

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render as ISO-8601 with an explicit `+00:00` offset.
pub fn to_iso8601(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}
