//! Single-in-flight lifecycle for fault-injection scenario requests.
//!
//! ```text
//!   Idle ──begin(name)──▶ InFlight { name } ──settle(outcome)──▶ Idle
//!                              │
//!                  begin() while InFlight is refused
//! ```
//!
//! Scenario controls are enabled exactly when the invoker is idle. There is no
//! queue: a second trigger while one request is outstanding is simply refused.

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::api::{ApiResponse, ControlApi};
use crate::feedback::{status_error, Feedback, NETWORK_ERROR_TEXT};
use crate::identity::ClientIdentity;

/// Scenarios the fault-injection server ships with.
pub const KNOWN_SCENARIOS: &[&str] = &[
    "normal_drive",
    "overcurrent",
    "steer_fault",
    "brake_fault",
    "battery_low",
    "heartbeat_loss",
    "can_loss",
    "estop",
    "reset",
];

/// Text shown when the server demands the lock first.
pub const ACQUIRE_FIRST_TEXT: &str = "Acquire the lock first";

/// A trigger attempt while another request is outstanding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("scenario '{in_flight}' is still in flight")]
pub struct ScenarioBusy {
    /// Scenario currently awaiting its response.
    pub in_flight: String,
}

/// Request slot of the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestSlot {
    /// Nothing outstanding; controls enabled.
    #[default]
    Idle,
    /// One request outstanding; controls disabled.
    InFlight {
        /// Scenario being triggered.
        scenario: String,
    },
}

/// Issues scenario requests one at a time.
#[derive(Debug, Clone)]
pub struct ScenarioInvoker {
    identity: ClientIdentity,
    slot: RequestSlot,
}

impl ScenarioInvoker {
    /// Idle invoker tagging requests with `identity`.
    pub fn new(identity: ClientIdentity) -> Self {
        Self {
            identity,
            slot: RequestSlot::Idle,
        }
    }

    /// Whether scenario-triggering controls are available.
    #[must_use]
    pub fn controls_enabled(&self) -> bool {
        self.slot == RequestSlot::Idle
    }

    /// Current slot.
    #[must_use]
    pub fn slot(&self) -> &RequestSlot {
        &self.slot
    }

    /// Start a request for `name`.
    ///
    /// On success the slot becomes `InFlight` and the caller receives the
    /// pending feedback plus the request future; the caller must hand the
    /// future's output to [`ScenarioInvoker::settle`].
    pub fn begin(
        &mut self,
        name: &str,
        api: Arc<dyn ControlApi>,
    ) -> Result<(Feedback, BoxFuture<'static, Feedback>), ScenarioBusy> {
        if let RequestSlot::InFlight { scenario } = &self.slot {
            return Err(ScenarioBusy {
                in_flight: scenario.clone(),
            });
        }
        self.slot = RequestSlot::InFlight {
            scenario: name.to_string(),
        };
        tracing::info!("Triggering scenario {}", name);

        let identity = self.identity.clone();
        let name_owned = name.to_string();
        let request: BoxFuture<'static, Feedback> = Box::pin(async move {
            scenario_feedback(api.trigger_scenario(&name_owned, &identity).await)
        });
        Ok((Feedback::pending(format!("Triggering {name}...")), request))
    }

    /// Record the outcome. Controls re-enable whatever the outcome was.
    pub fn settle(&mut self, outcome: Feedback) -> Feedback {
        if let RequestSlot::InFlight { scenario } = &self.slot {
            tracing::debug!(scenario = %scenario, outcome = %outcome, "scenario settled");
        }
        self.slot = RequestSlot::Idle;
        outcome
    }
}

/// Map a scenario outcome to feedback.
pub fn scenario_feedback(result: crate::Result<ApiResponse>) -> Feedback {
    let response = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Scenario request got no response: {}", e);
            return Feedback::error(NETWORK_ERROR_TEXT);
        }
    };
    match response.status {
        200 => Feedback::success(
            response
                .text_field(&["result"])
                .unwrap_or_else(|| "OK".to_string()),
        ),
        403 => Feedback::error(
            response
                .reason()
                .unwrap_or_else(|| "Locked by another user".to_string()),
        ),
        423 => Feedback::error(ACQUIRE_FIRST_TEXT),
        status => {
            tracing::warn!("Scenario request failed with status {}", status);
            status_error(status)
        }
    }
}
