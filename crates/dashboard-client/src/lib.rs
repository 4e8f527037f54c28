//! Telemetry client library for the vehicle-in-the-loop dashboard.
//!
//! This crate holds everything the dashboard does short of drawing: the
//! supervised telemetry stream, log and notification reconciliation, control
//! lock arbitration, and scenario requests. It is UI-agnostic and can be
//! driven by the bundled console, test harnesses, or alternative frontends.

pub mod api;
pub mod connection;
pub mod error;
pub mod feedback;
pub mod identity;
mod lenient;
pub mod lock;
pub mod log_stream;
pub mod notifications;
pub mod reconnect;
pub mod scenario;
pub mod telemetry;
pub mod transport;
pub mod view;

pub use api::{ApiResponse, ControlApi, HttpApi, NotificationSource, ScenarioInfo};
pub use connection::{
    normalize_url, resolve_address, AddressError, AddressSource, Endpoints, ServerAddress,
    DEFAULT_HTTP_PORT, DEFAULT_SERVER_URL,
};
pub use error::{ClientError, Result};
pub use feedback::{Feedback, FeedbackKind};
pub use identity::{ClientIdentity, FileStorage, MemoryStorage, SessionStorage};
pub use lock::{ControlLockClient, LockView};
pub use log_stream::{CanLogEntry, EventEntry, LogStreamMerger};
pub use notifications::{Notification, NotificationReconciler};
pub use reconnect::{
    ConnectionState, ConnectionSupervisor, Connector, ReconnectConfig, SupervisorUpdate,
};
pub use scenario::{ScenarioBusy, ScenarioInvoker, KNOWN_SCENARIOS};
pub use telemetry::{LockState, TelemetrySnapshot};
pub use transport::WsConnector;
pub use view::{LogLine, NotificationTable, ReconcileReport, TelemetryReconciler};
