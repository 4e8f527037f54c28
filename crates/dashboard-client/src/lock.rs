//! Control-lock ownership display and acquire/release requests.
//!
//! The displayed lock state is derived only from the latest streamed
//! [`LockState`]. Acquire and release produce feedback text and nothing else;
//! whatever they achieved shows up on the display with the next frame.
//!
//! ```text
//!              streamed LockState
//!   Unlocked ◀──────────────────────▶ Mine / LockedByOther
//!      (locked = false)        (locked = true, holder ==/!= me)
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::api::{ApiResponse, ControlApi};
use crate::feedback::{status_error, Feedback, NETWORK_ERROR_TEXT};
use crate::identity::ClientIdentity;
use crate::telemetry::LockState;

/// Time-to-live assumed when the acquire response does not state one.
pub const DEFAULT_GRANTED_TTL_SECS: u64 = 120;

/// Exactly one of the three lock displays.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LockView {
    /// Nobody holds the lock.
    #[default]
    Unlocked,
    /// This session holds the lock.
    Mine {
        /// Whole seconds left, rounded up.
        remaining_secs: u64,
    },
    /// Another session holds the lock.
    LockedByOther {
        /// Holder identity.
        holder: String,
        /// Whole seconds left, rounded up.
        remaining_secs: u64,
    },
}

impl LockView {
    /// Derive the display for `state` as seen by `me`.
    pub fn derive(state: &LockState, me: &ClientIdentity) -> Self {
        if !state.locked {
            return Self::Unlocked;
        }
        let remaining_secs = ceil_secs(state.remaining_sec);
        if state.client_id == me.as_str() {
            Self::Mine { remaining_secs }
        } else {
            Self::LockedByOther {
                holder: state.client_id.clone(),
                remaining_secs,
            }
        }
    }

    /// Badge text.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::Unlocked => "Unlocked".to_string(),
            Self::Mine { .. } => "You have control".to_string(),
            Self::LockedByOther { holder, .. } => format!("Locked by {holder}"),
        }
    }

    /// Remaining-time text, empty when unlocked.
    #[must_use]
    pub fn remaining_text(&self) -> String {
        match self {
            Self::Unlocked => String::new(),
            Self::Mine { remaining_secs } | Self::LockedByOther { remaining_secs, .. } => {
                format!("{remaining_secs}s remaining")
            }
        }
    }

    /// Whether this session holds the lock.
    #[must_use]
    pub fn is_mine(&self) -> bool {
        matches!(self, Self::Mine { .. })
    }
}

impl fmt::Display for LockView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlocked => f.write_str("Unlocked"),
            _ => write!(f, "{}, {}", self.status_text(), self.remaining_text()),
        }
    }
}

fn ceil_secs(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        secs.ceil() as u64
    } else {
        0
    }
}

/// Tracks lock ownership relative to the local identity.
#[derive(Debug, Clone)]
pub struct ControlLockClient {
    identity: ClientIdentity,
    view: LockView,
}

impl ControlLockClient {
    /// Start with an unlocked display.
    pub fn new(identity: ClientIdentity) -> Self {
        Self {
            identity,
            view: LockView::Unlocked,
        }
    }

    /// Apply the control section of a frame. `None` leaves the display untouched.
    ///
    /// Returns `true` if the display changed.
    pub fn apply(&mut self, state: Option<&LockState>) -> bool {
        let Some(state) = state else {
            return false;
        };
        let view = LockView::derive(state, &self.identity);
        if view == self.view {
            return false;
        }
        tracing::debug!(lock = %view, "lock display updated");
        self.view = view;
        true
    }

    /// Current display.
    #[must_use]
    pub fn view(&self) -> &LockView {
        &self.view
    }

    /// Local identity.
    #[must_use]
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Build an acquire request. Resolving it yields feedback only.
    pub fn acquire(&self, api: Arc<dyn ControlApi>) -> BoxFuture<'static, Feedback> {
        let identity = self.identity.clone();
        Box::pin(async move { acquire_feedback(api.acquire_lock(&identity).await) })
    }

    /// Build a release request. Resolving it yields feedback only.
    pub fn release(&self, api: Arc<dyn ControlApi>) -> BoxFuture<'static, Feedback> {
        let identity = self.identity.clone();
        Box::pin(async move { release_feedback(api.release_lock(&identity).await) })
    }
}

/// Map an acquire outcome to feedback.
pub fn acquire_feedback(result: crate::Result<ApiResponse>) -> Feedback {
    let response = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Lock acquire got no response: {}", e);
            return Feedback::error(NETWORK_ERROR_TEXT);
        }
    };
    match response.status {
        200 => {
            let ttl = response
                .number_field("remaining_sec")
                .map_or(DEFAULT_GRANTED_TTL_SECS, ceil_secs);
            tracing::info!("Lock acquired for {}s", ttl);
            Feedback::success(format!("Lock acquired ({ttl}s)"))
        }
        409 => {
            let reason = response
                .reason()
                .unwrap_or_else(|| "Another user has control".to_string());
            tracing::warn!("Lock acquire rejected: {}", reason);
            Feedback::error(reason)
        }
        status => {
            tracing::warn!("Lock acquire failed with status {}", status);
            status_error(status)
        }
    }
}

/// Map a release outcome to feedback.
pub fn release_feedback(result: crate::Result<ApiResponse>) -> Feedback {
    match result {
        Ok(response) if response.status == 200 => {
            tracing::info!("Lock released");
            Feedback::success("Lock released")
        }
        Ok(response) => {
            tracing::warn!("Lock release failed with status {}", response.status);
            response
                .reason()
                .map_or_else(|| status_error(response.status), Feedback::error)
        }
        Err(e) => {
            tracing::warn!("Lock release got no response: {}", e);
            Feedback::error(NETWORK_ERROR_TEXT)
        }
    }
}
