//! Server address configuration, URL normalization and endpoint derivation.
//!
//! This module provides types and utilities for locating the dashboard backend:
//! - [`ServerAddress`]: Validated base URL with source tracking
//! - [`AddressSource`]: Where the address configuration came from
//! - [`AddressError`]: User-friendly validation errors
//! - [`Endpoints`]: Telemetry stream and REST endpoints derived from one address
//!
//! # URL Normalization
//!
//! The [`normalize_url`] function handles common input formats:
//! - Bare host:port (e.g., `10.0.0.5:8080` → `http://10.0.0.5:8080`)
//! - Missing port (e.g., `http://localhost` → `http://localhost:8080`)
//! - IPv6 addresses (e.g., `[::1]:8080` → `http://[::1]:8080`)
//!
//! # Example
//!
//! ```
//! use dashboard_client::connection::{AddressSource, Endpoints, ServerAddress};
//!
//! let addr = ServerAddress::parse("10.0.0.5:8080", AddressSource::CommandLine)?;
//! assert_eq!(addr.as_str(), "http://10.0.0.5:8080/");
//!
//! let endpoints = Endpoints::new(&addr)?;
//! assert_eq!(endpoints.telemetry().as_str(), "ws://10.0.0.5:8080/ws/telemetry");
//! # Ok::<(), dashboard_client::ClientError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Default HTTP port of the dashboard backend.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default server address when no configuration is provided.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Environment variable consulted by [`resolve_address`].
pub const SERVER_URL_ENV: &str = "VIL_DASHBOARD_SERVER_URL";

const TELEMETRY_PATH: &str = "/ws/telemetry";
const SCENARIO_PATH: &str = "/api/fault/scenario/";
const SCENARIO_LIST_PATH: &str = "/api/fault/scenarios";
const ACQUIRE_PATH: &str = "/api/fault/control/acquire";
const RELEASE_PATH: &str = "/api/fault/control/release";
const LOCK_STATUS_PATH: &str = "/api/fault/control/status";
const NOTIFICATIONS_PATH: &str = "/api/sap/opu/odata/sap/API_QUALITYNOTIFICATION/QualityNotification";

/// Source of the server address configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressSource {
    /// Hardcoded default (`http://127.0.0.1:8080`)
    Default,
    /// Loaded from `VIL_DASHBOARD_SERVER_URL`
    Environment,
    /// Read from the configuration file
    ConfigFile,
    /// Passed with `--base-url`
    CommandLine,
}

impl AddressSource {
    /// Returns the priority for address resolution (higher = preferred).
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::ConfigFile => 1,
            Self::Environment => 2,
            Self::CommandLine => 3,
        }
    }

    /// Returns a short label for display.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Environment => "env",
            Self::ConfigFile => "config",
            Self::CommandLine => "cli",
        }
    }
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Environment => write!(f, "Environment ({SERVER_URL_ENV})"),
            Self::ConfigFile => write!(f, "Configuration file"),
            Self::CommandLine => write!(f, "Command line"),
        }
    }
}

/// Validated server address with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAddress {
    /// The normalized URL (always has scheme and port)
    url: String,
    /// Where this address came from
    source: AddressSource,
    /// Original input string (for display/debugging)
    original: String,
}

impl ServerAddress {
    /// Parse and normalize a server URL.
    pub fn parse(input: &str, source: AddressSource) -> Result<Self, AddressError> {
        let normalized = normalize_url(input)?;
        Ok(Self {
            url: normalized.to_string(),
            source,
            original: input.to_string(),
        })
    }

    /// Returns the normalized URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Returns where this address came from.
    #[must_use]
    pub fn source(&self) -> AddressSource {
        self.source
    }

    /// Returns the original input string before normalization.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Returns `true` if this address uses TLS (https scheme).
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.url.starts_with("https://")
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// URL validation error with user-friendly messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input was empty or whitespace-only
    EmptyInput,
    /// URL parsing failed
    InvalidUrl(String),
    /// No host was found in the URL
    MissingHost,
    /// Port could not be set (should not happen with valid hosts)
    InvalidPort(String),
    /// Unsupported URL scheme (only http/https allowed)
    UnsupportedScheme(String),
}

impl std::error::Error for AddressError {}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "Address cannot be empty"),
            Self::InvalidUrl(e) => write!(f, "Invalid URL: {e}"),
            Self::MissingHost => write!(f, "URL must include a host"),
            Self::InvalidPort(e) => write!(f, "Invalid port: {e}"),
            Self::UnsupportedScheme(s) => write!(f, "Unsupported scheme '{s}' (use http or https)"),
        }
    }
}

/// Normalize a server URL string.
///
/// - Adds `http://` scheme if missing
/// - Adds default port (8080) if missing
/// - Trims whitespace
/// - Normalizes scheme to lowercase
pub fn normalize_url(input: &str) -> Result<Url, AddressError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(AddressError::EmptyInput);
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| AddressError::InvalidUrl(e.to_string()))?;

    let scheme = url.scheme().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(AddressError::UnsupportedScheme(scheme));
    }

    if url.host().is_none() {
        return Err(AddressError::MissingHost);
    }

    if url.port().is_none() {
        url.set_port(Some(DEFAULT_HTTP_PORT))
            .map_err(|()| AddressError::InvalidPort("Cannot set port on this URL".to_string()))?;
    }

    Ok(url)
}

/// Resolve the server address from the available sources.
///
/// Candidates are tried in [`AddressSource::priority`] order: command line,
/// `VIL_DASHBOARD_SERVER_URL`, configuration file, then the default. Blank or
/// invalid candidates are skipped.
pub fn resolve_address(cli: Option<&str>, config_file: Option<&str>) -> ServerAddress {
    let env = std::env::var(SERVER_URL_ENV).ok();
    let mut candidates = [
        (config_file, AddressSource::ConfigFile),
        (env.as_deref(), AddressSource::Environment),
        (cli, AddressSource::CommandLine),
    ];
    candidates.sort_by_key(|(_, source)| std::cmp::Reverse(source.priority()));

    for (input, source) in candidates {
        let Some(input) = input.filter(|s| !s.trim().is_empty()) else {
            continue;
        };
        match ServerAddress::parse(input, source) {
            Ok(addr) => return addr,
            Err(e) => tracing::warn!("Ignoring {} address '{}': {}", source.label(), input, e),
        }
    }

    ServerAddress {
        url: format!("{DEFAULT_SERVER_URL}/"),
        source: AddressSource::Default,
        original: DEFAULT_SERVER_URL.to_string(),
    }
}

/// Every URL the dashboard talks to, derived from one [`ServerAddress`].
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
    telemetry: Url,
}

impl Endpoints {
    /// Derive endpoints from a validated address.
    ///
    /// The telemetry stream uses `ws://` for `http://` and `wss://` for `https://`.
    pub fn new(address: &ServerAddress) -> crate::Result<Self> {
        let base = Url::parse(address.as_str())?;
        let mut telemetry = base.join(TELEMETRY_PATH)?;
        let ws_scheme = if address.is_tls() { "wss" } else { "ws" };
        telemetry
            .set_scheme(ws_scheme)
            .map_err(|()| crate::ClientError::Connection(format!("cannot use {ws_scheme} scheme")))?;
        Ok(Self { base, telemetry })
    }

    /// Streaming telemetry endpoint.
    #[must_use]
    pub fn telemetry(&self) -> &Url {
        &self.telemetry
    }

    /// `POST` target for a named scenario. The name is percent-encoded as a path segment.
    pub fn scenario(&self, name: &str) -> crate::Result<Url> {
        let mut url = self.base.join(SCENARIO_PATH)?;
        url.path_segments_mut()
            .map_err(|()| crate::ClientError::Connection("base URL cannot hold a path".into()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    /// Scenario catalogue.
    pub fn scenario_list(&self) -> crate::Result<Url> {
        Ok(self.base.join(SCENARIO_LIST_PATH)?)
    }

    /// Lock acquisition.
    pub fn acquire(&self) -> crate::Result<Url> {
        Ok(self.base.join(ACQUIRE_PATH)?)
    }

    /// Lock release.
    pub fn release(&self) -> crate::Result<Url> {
        Ok(self.base.join(RELEASE_PATH)?)
    }

    /// Current lock state as known by the control server.
    pub fn lock_status(&self) -> crate::Result<Url> {
        Ok(self.base.join(LOCK_STATUS_PATH)?)
    }

    /// First page of quality notifications, newest first.
    pub fn notifications(&self, page_size: u32) -> crate::Result<Url> {
        let mut url = self.base.join(NOTIFICATIONS_PATH)?;
        url.query_pairs_mut()
            .append_pair("$top", &page_size.to_string())
            .append_pair("$orderby", "created_at desc");
        Ok(url)
    }
}
