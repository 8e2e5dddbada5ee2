//! Environment-driven settings for the worker process.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use ovenline_core::connect::ORDER_QUEUE;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub queue: String,
    pub prefetch: u16,
    pub connect_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub prep_duration: Duration,
}

impl WorkerSettings {
    /// Read settings from the environment, falling back to defaults that
    /// work out of the box with the in-memory adapters.
    pub fn from_env() -> Self {
        Self {
            queue: env::var("ORDER_QUEUE").unwrap_or_else(|_| ORDER_QUEUE.to_string()),
            prefetch: parse_env("WORKER_PREFETCH", 1),
            connect_attempts: parse_env("BROKER_CONNECT_ATTEMPTS", 10),
            backoff_base: Duration::from_millis(parse_env("BROKER_BACKOFF_BASE_MS", 2_000)),
            backoff_max: Duration::from_millis(parse_env("BROKER_BACKOFF_MAX_MS", 60_000)),
            prep_duration: Duration::from_millis(parse_env("PREP_DURATION_MS", 5_000)),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        // Not set in the test environment.
        let settings = WorkerSettings::from_env();
        assert_eq!(settings.queue, ORDER_QUEUE);
        assert_eq!(settings.prefetch, 1);
        assert_eq!(settings.connect_attempts, 10);
    }

    #[test]
    fn unparseable_values_fall_back() {
        assert_eq!(parse_env("DEFINITELY_NOT_SET", 7u32), 7);
    }
}
