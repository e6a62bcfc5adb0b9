//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

/// Default deadline for interactive remote reads and writes.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for profile search.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for local durable store access.
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for a geolocation fix.
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(8);

/// Core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// SQLite URL of the remote store.
    pub database_url: String,
    /// SQLite URL of the on-device key/value store.
    pub local_store_url: String,
    /// Deadline for remote store operations.
    pub remote_timeout: Duration,
    /// Deadline for profile search.
    pub search_timeout: Duration,
    /// Deadline for local store operations.
    pub local_timeout: Duration,
    /// Deadline for a geolocation fix.
    pub location_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:rider.db?mode=rwc".to_string(),
            local_store_url: "sqlite:rider-local.db?mode=rwc".to_string(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `RIDER_DATABASE_URL` | Remote store URL | `sqlite:rider.db?mode=rwc` |
    /// | `RIDER_LOCAL_STORE_URL` | Local store URL | `sqlite:rider-local.db?mode=rwc` |
    /// | `RIDER_REMOTE_TIMEOUT_SECS` | Remote deadline | `10` |
    /// | `RIDER_SEARCH_TIMEOUT_SECS` | Search deadline | `5` |
    /// | `RIDER_LOCAL_TIMEOUT_SECS` | Local store deadline | `5` |
    /// | `RIDER_LOCATION_TIMEOUT_SECS` | Geolocation deadline | `8` |
    ///
    /// Unparseable durations fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = env::var("RIDER_DATABASE_URL").unwrap_or(defaults.database_url);
        if !database_url.starts_with("sqlite:") {
            return Err(ConfigError::InvalidUrl("RIDER_DATABASE_URL"));
        }

        let local_store_url =
            env::var("RIDER_LOCAL_STORE_URL").unwrap_or(defaults.local_store_url);
        if !local_store_url.starts_with("sqlite:") {
            return Err(ConfigError::InvalidUrl("RIDER_LOCAL_STORE_URL"));
        }

        Ok(Self {
            database_url,
            local_store_url,
            remote_timeout: secs_var("RIDER_REMOTE_TIMEOUT_SECS", defaults.remote_timeout),
            search_timeout: secs_var("RIDER_SEARCH_TIMEOUT_SECS", defaults.search_timeout),
            local_timeout: secs_var("RIDER_LOCAL_TIMEOUT_SECS", defaults.local_timeout),
            location_timeout: secs_var("RIDER_LOCATION_TIMEOUT_SECS", defaults.location_timeout),
        })
    }
}

/// Read a whole-seconds duration variable, falling back on absence or parse failure.
pub fn secs_var(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be a sqlite: URL")]
    InvalidUrl(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert_eq!(config.search_timeout, Duration::from_secs(5));
        assert!(config.database_url.starts_with("sqlite:"));
    }

    #[test]
    fn test_secs_var_falls_back() {
        let fallback = Duration::from_secs(7);
        assert_eq!(secs_var("RIDER_TEST_UNSET_VARIABLE", fallback), fallback);
    }
}
