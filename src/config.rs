//! Dashboard configuration using Figment.
//!
//! Configuration is layered, later layers winning:
//! 1. Built-in defaults
//! 2. `config/dashboard.toml` (or the file given with `--config`)
//! 3. Environment variables prefixed with `VIL_DASHBOARD_`, nested keys
//!    separated by `__`
//!
//! # Example
//! ```no_run
//! use vil_dashboard::config::DashboardConfig;
//!
//! let config = DashboardConfig::load()?;
//! println!("Server: {:?}", config.server.base_url);
//! # Ok::<(), vil_dashboard::error::DashboardError>(())
//! ```
//!
//! `VIL_DASHBOARD_NOTIFICATIONS__POLL_INTERVAL_MS=2000` overrides
//! `notifications.poll_interval_ms`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dashboard_client::ReconnectConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DashboardError};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/dashboard.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "VIL_DASHBOARD_";

/// Accepted `application.log_level` values.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Accepted `application.log_format` values.
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level dashboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Telemetry bridge / control server location
    #[serde(default)]
    pub server: ServerConfig,
    /// Stream reconnect backoff
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Log panel retention
    #[serde(default)]
    pub logs: LogConfig,
    /// Notification polling
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Client identity persistence
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Server location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the gateway; telemetry and REST endpoints hang off it.
    /// Unset means the built-in default address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request timeout for control and notification calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Reconnect backoff in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// Delay after the first close following a successful open
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Cap on the doubled delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

/// Log panel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Entries retained per log stream
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

/// Notification poll settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Full-refresh interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Records requested per poll
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// Identity persistence.
///
/// By default the identity lives only as long as the process, matching a
/// browser tab session. With `persist = true` it is kept in a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Keep the identity across runs
    #[serde(default)]
    pub persist: bool,
    /// Storage file; defaults to the user cache directory
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

fn default_app_name() -> String {
    "VIL Dashboard".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_entries() -> usize {
    200
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_page_size() -> u32 {
    20
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            page_size: default_page_size(),
        }
    }
}

impl DashboardConfig {
    /// Load from `config/dashboard.toml` and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider chain, exposed for callers that add layers.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            return Err(invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                LOG_FORMATS.join(", ")
            )));
        }

        if self
            .server
            .base_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(invalid("server.base_url must not be empty when set"));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(invalid("server.request_timeout_ms must be greater than 0"));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(invalid("reconnect.base_delay_ms must be greater than 0"));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(invalid(format!(
                "reconnect.base_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }

        if self.logs.max_entries == 0 {
            return Err(invalid("logs.max_entries must be greater than 0"));
        }

        if self.notifications.poll_interval_ms == 0 {
            return Err(invalid("notifications.poll_interval_ms must be greater than 0"));
        }
        if self.notifications.page_size == 0 {
            return Err(invalid("notifications.page_size must be greater than 0"));
        }

        Ok(())
    }

    /// Backoff settings for the stream supervisor.
    #[must_use]
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
        }
    }

    /// Notification poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.notifications.poll_interval_ms)
    }

    /// Control/notification request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// Identity file location, if identities are persisted.
    #[must_use]
    pub fn identity_storage_path(&self) -> Option<PathBuf> {
        if !self.identity.persist {
            return None;
        }
        self.identity.storage_path.clone().or_else(|| {
            dirs::cache_dir().map(|dir| dir.join("vil-dashboard").join("session.json"))
        })
    }
}

fn invalid(message: impl Into<String>) -> DashboardError {
    DashboardError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect_config().base_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect_config().max_delay, Duration::from_millis(30_000));
        assert_eq!(config.logs.max_entries, 200);
        assert_eq!(config.notifications.page_size, 20);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.identity_storage_path(), None);
        assert_eq!(config.server.base_url, None);
    }

    #[test]
    fn test_blank_base_url_rejected() {
        let mut config = DashboardConfig::default();
        config.server.base_url = Some("  ".to_string());
        assert!(matches!(
            config.validate(),
            Err(DashboardError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = DashboardConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(DashboardError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_and_inverted_values_rejected() {
        let mut config = DashboardConfig::default();
        config.logs.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.notifications.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.notifications.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.reconnect.base_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.reconnect.base_delay_ms = 60_000;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("exceeds"), "{err}");
    }

    #[test]
    fn test_explicit_storage_path_used_when_persisting() {
        let mut config = DashboardConfig::default();
        config.identity.storage_path = Some(PathBuf::from("/tmp/id.json"));
        assert_eq!(config.identity_storage_path(), None);
        config.identity.persist = true;
        assert_eq!(
            config.identity_storage_path(),
            Some(PathBuf::from("/tmp/id.json"))
        );
    }
}
