//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL stores when set, in-memory otherwise
/// - `REDIS_URL` — Redis cache when set and built with the `redis` feature
/// - `CACHE_TTL_SECS` — product cache TTL (default: `1800`)
/// - `PUBLISH_TIMEOUT_MS` — broker acknowledgement timeout (default: `2000`)
/// - `RESERVE_MAX_ATTEMPTS` — optimistic reservation rounds (default: `5`)
/// - `BROKER_QUEUE_DEPTH` — messages kept per in-memory queue (default: `10000`)
///
/// Unparseable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub publish_timeout: Duration,
    pub reserve_max_attempts: u32,
    pub broker_queue_depth: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            cache_ttl: parsed("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            publish_timeout: parsed("PUBLISH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_timeout),
            reserve_max_attempts: parsed("RESERVE_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.reserve_max_attempts),
            broker_queue_depth: parsed("BROKER_QUEUE_DEPTH")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.broker_queue_depth),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            redis_url: None,
            cache_ttl: read_cache::DEFAULT_TTL,
            publish_timeout: messaging::DEFAULT_PUBLISH_TIMEOUT,
            reserve_max_attempts: inventory::reservation::DEFAULT_MAX_ATTEMPTS,
            broker_queue_depth: messaging::DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}
