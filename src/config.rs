//! Configuration loaded from the environment.

use std::env;
use std::time::Duration;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:waypost.db?mode=rwc";

/// Default lifetime of a cached zone catalog snapshot.
const DEFAULT_ZONE_CACHE_SECONDS: u64 = 30;

/// Default upper bound on one webhook call.
const DEFAULT_NOTIFY_TIMEOUT_SECONDS: u64 = 5;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Port the HTTP server listens on.
    pub port: u16,

    /// SQLite connection string.
    pub database_url: String,

    /// How long a zone catalog snapshot may be served from cache.
    pub zone_cache_ttl: Duration,

    /// Webhook that receives notifications. Delivery is off when unset.
    pub notify_webhook_url: Option<String>,

    /// How long one webhook call may take before it is abandoned.
    pub notify_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_PATH.to_string(),
            zone_cache_ttl: Duration::from_secs(DEFAULT_ZONE_CACHE_SECONDS),
            notify_webhook_url: None,
            notify_timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECONDS),
        }
    }
}

impl Config {
    /// Load configuration from `WAYPOST_*` environment variables.
    ///
    /// Missing or unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            port: lookup("WAYPOST_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            database_url: lookup("WAYPOST_DATABASE_URL").unwrap_or(defaults.database_url),

            zone_cache_ttl: lookup("WAYPOST_ZONE_CACHE_SECONDS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.zone_cache_ttl),

            notify_webhook_url: lookup("WAYPOST_NOTIFY_WEBHOOK_URL").filter(|u| !u.is_empty()),

            // Must be positive
            notify_timeout: lookup("WAYPOST_NOTIFY_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.notify_timeout),
        }
    }
}
