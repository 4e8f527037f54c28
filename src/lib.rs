//! # VIL Dashboard
//!
//! Headless dashboard for the vehicle-in-the-loop test bench. The heavy
//! lifting (stream supervision, log and notification reconciliation, lock and
//! scenario requests) lives in the `dashboard_client` crate; this crate wires
//! it into a running application.
//!
//! - **`config`**: layered Figment configuration and its validation.
//! - **`error`**: the application-level `DashboardError`.
//! - **`render`**: the `Renderer` trait and the console implementation.
//! - **`session`**: `DashboardSession`, the context object and event loop.
//! - **`tracing_setup`**: subscriber initialization.

pub mod config;
pub mod error;
pub mod render;
pub mod session;
pub mod tracing_setup;

pub use config::DashboardConfig;
pub use error::{AppResult, DashboardError};
pub use session::{DashboardSession, SessionBackends, UiCommand};
