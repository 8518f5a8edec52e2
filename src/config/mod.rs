// src/config/mod.rs
//! Service configuration read from the environment (after `.env` is loaded).

pub mod secrets;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::fetch::FetchConfig;
use crate::sources::config::resolve_sources_path;

pub use secrets::{SecretLookup, Secrets};

pub const ENV_FETCH_ATTEMPTS: &str = "SOURCE_FETCH_ATTEMPTS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "SOURCE_FETCH_TIMEOUT_SECS";
pub const ENV_FETCH_BACKOFF_MS: &str = "SOURCE_FETCH_BACKOFF_MS";
pub const ENV_FETCH_MAX_RETRY_AFTER_SECS: &str = "SOURCE_FETCH_MAX_RETRY_AFTER_SECS";
pub const ENV_METRICS_ENABLED: &str = "METRICS_ENABLED";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sources_path: PathBuf,
    /// True when `SOURCES_CONFIG_PATH` chose the path (a missing file is then an error).
    pub sources_path_explicit: bool,
    pub fetch: FetchConfig,
    pub metrics_enabled: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let (sources_path, sources_path_explicit) = resolve_sources_path();
        let defaults = FetchConfig::default();

        let fetch = FetchConfig {
            max_attempts: env_parse::<u32>(ENV_FETCH_ATTEMPTS)
                .unwrap_or(defaults.max_attempts)
                .max(1),
            timeout: env_parse::<u64>(ENV_FETCH_TIMEOUT_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            backoff_base: env_parse::<u64>(ENV_FETCH_BACKOFF_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            max_retry_after: env_parse::<u64>(ENV_FETCH_MAX_RETRY_AFTER_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_retry_after),
        };

        Self {
            sources_path,
            sources_path_explicit,
            fetch,
            metrics_enabled: env_flag(ENV_METRICS_ENABLED),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_overrides_and_bad_values_fall_back() {
        std::env::set_var(ENV_FETCH_ATTEMPTS, "5");
        std::env::set_var(ENV_FETCH_TIMEOUT_SECS, "not-a-number");
        std::env::set_var(ENV_FETCH_BACKOFF_MS, "250");
        std::env::set_var(ENV_METRICS_ENABLED, "1");

        let cfg = AppConfig::from_env();
        assert_eq!(cfg.fetch.max_attempts, 5);
        assert_eq!(cfg.fetch.timeout, Duration::from_secs(10));
        assert_eq!(cfg.fetch.backoff_base, Duration::from_millis(250));
        assert!(cfg.metrics_enabled);

        std::env::set_var(ENV_FETCH_ATTEMPTS, "0");
        assert_eq!(AppConfig::from_env().fetch.max_attempts, 1);

        for k in [
            ENV_FETCH_ATTEMPTS,
            ENV_FETCH_TIMEOUT_SECS,
            ENV_FETCH_BACKOFF_MS,
            ENV_METRICS_ENABLED,
        ] {
            std::env::remove_var(k);
        }
    }
}
