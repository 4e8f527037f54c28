//! Custom error types for the dashboard application.
//!
//! `DashboardError` is the application-level error. Client-side failures
//! (transport, decode, storage) arrive as [`ClientError`] and are wrapped;
//! configuration problems come either from Figment while extracting
//! (`Config`) or from semantic validation afterwards (`Configuration`).
//!
//! Nothing in the running session returns these errors for network trouble:
//! those end as status or feedback updates. These errors cover startup.

use dashboard_client::ClientError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DashboardError>;

/// Application errors.
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client library failure.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Tracing subscriber could not be installed.
    #[error("Tracing initialization error: {0}")]
    Tracing(String),
}

impl From<figment::Error> for DashboardError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
