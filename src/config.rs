//! Configuration loading and management.
//!
//! Configuration is loaded with the following precedence:
//! 1. Environment variables (`MAU_*`)
//! 2. Config file (`~/.mau/config.toml`)
//! 3. Defaults

use crate::error::{Error, Result};
use crate::storage::file::get_mau_home;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Chat API configuration.
    pub api: ApiConfig,

    /// Reveal timing.
    pub stream: StreamConfig,

    /// Chat behavior.
    pub chat: ChatConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the mau home directory.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: get_mau_home(),
        }
    }
}

/// Chat API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the API serving `/api/chat` and `/api/ogp`.
    pub base_url: String,

    /// Seconds before an exchange is abandoned as failed.
    pub request_timeout_secs: u64,

    /// Number of prior messages sent as context.
    pub history_limit: usize,
}

impl ApiConfig {
    /// Request timeout as a [`Duration`], at least one second.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            history_limit: 12,
        }
    }
}

/// Reveal timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Milliseconds between revealed characters.
    pub tick_ms: u64,
}

impl StreamConfig {
    /// Tick interval as a [`Duration`], never zero.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { tick_ms: 30 }
    }
}

/// Chat behavior.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChatConfig {
    /// IANA timezone sent with each exchange. Falls back to `TZ`, then the
    /// system zone, then UTC.
    pub timezone: Option<String>,
}

impl ChatConfig {
    /// The IANA timezone identifier to send.
    #[must_use]
    pub fn resolve_timezone(&self) -> String {
        self.timezone
            .as_deref()
            .and_then(iana_name)
            .or_else(|| env::var("TZ").ok().as_deref().and_then(iana_name))
            .or_else(|| {
                iana_time_zone::get_timezone()
                    .ok()
                    .as_deref()
                    .and_then(iana_name)
            })
            .unwrap_or_else(|| "UTC".to_string())
    }
}

/// Extract an IANA zone name (`Area/City` or `UTC`) from a timezone value.
///
/// Accepts the `:`-prefixed form and paths into a `zoneinfo` directory.
/// POSIX rule strings such as `JST-9` yield `None`.
fn iana_name(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_start_matches(':');
    let name = match raw.rsplit_once("zoneinfo/") {
        Some((_, name)) => name,
        None if raw.starts_with('/') => return None,
        None => raw,
    };

    let segment_ok = |segment: &str| {
        segment.starts_with(|c: char| c.is_ascii_alphabetic())
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
    };

    let is_area_city = name.contains('/') && name.split('/').all(segment_ok);
    (is_area_city || name == "UTC").then(|| name.to_string())
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. "warn", "mau=debug").
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Load configuration with precedence: env vars → file → defaults.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    // Try to load config file
    let config_path = get_config_path();
    if config_path.exists() {
        let contents = fs::read_to_string(&config_path).map_err(Error::Storage)?;
        config = toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
    }

    // Override with environment variables
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the path to the config file.
fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("MAU_CONFIG") {
        return PathBuf::from(path);
    }

    get_mau_home().join("config.toml")
}

/// Apply environment variable overrides to config.
fn apply_env_overrides(config: &mut Config) {
    // Storage path
    if let Ok(path) = env::var("MAU_STORAGE_PATH") {
        config.storage.path = PathBuf::from(path);
    }

    // API
    if let Ok(url) = env::var("MAU_API_URL") {
        config.api.base_url = url;
    }

    if let Ok(val) = env::var("MAU_REQUEST_TIMEOUT_SECS") {
        if let Ok(secs) = val.parse() {
            config.api.request_timeout_secs = secs;
        }
    }

    if let Ok(val) = env::var("MAU_HISTORY_LIMIT") {
        if let Ok(limit) = val.parse() {
            config.api.history_limit = limit;
        }
    }

    // Stream
    if let Ok(val) = env::var("MAU_TICK_MS") {
        if let Ok(ms) = val.parse() {
            config.stream.tick_ms = ms;
        }
    }

    // Chat
    if let Ok(tz) = env::var("MAU_TIMEZONE") {
        config.chat.timezone = Some(tz);
    }

    // Logging
    if let Ok(level) = env::var("MAU_LOG_LEVEL") {
        config.logging.level = level;
    }
}
