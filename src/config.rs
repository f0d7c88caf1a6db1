//! Environment-backed configuration helpers
//!
//! Subscriber installation and dotenv loading belong to the process entry
//! point; this module only reads variables that are already set.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::types::WorkerId;

/// Parse an environment variable, falling back to a default on absence or
/// a value that does not parse.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("ignoring unparsable value for {}: {}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a duration expressed in whole seconds.
pub(crate) fn env_duration_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(key, default.as_secs()))
}

/// Worker identity from WORKER_NAME, or a generated fallback.
pub fn worker_id_from_env() -> WorkerId {
    match env::var("WORKER_NAME") {
        Ok(name) if !name.is_empty() => WorkerId::from(name),
        _ => WorkerId::generate(),
    }
}
