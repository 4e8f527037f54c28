//! The dashboard session: one context object owning all client state.
//!
//! Everything mutable (connection, backoff, watermarks, notification store,
//! lock display, scenario slot) lives in one [`DashboardSession`]. Its event
//! loop handles one event at a time, so no state is shared or locked.
//! Network requests run as spawned tasks whose results come back through a
//! channel and are applied by the loop like any other event.
//!
//! ```text
//!            ┌────────── supervisor updates (status, snapshots)
//!            ├────────── notification poll tick
//!   loop ◀───┼────────── request outcomes (lock, scenario, poll)
//!            └────────── UI commands
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashboard_client::api::ScenarioInfo;
use dashboard_client::lock::LockView;
use dashboard_client::{
    ClientIdentity, ConnectionState, ConnectionSupervisor, Connector, ControlApi, Endpoints,
    Feedback, FileStorage, HttpApi, LockState, MemoryStorage, Notification, NotificationSource,
    ScenarioInvoker, SupervisorUpdate, TelemetryReconciler, WsConnector,
    KNOWN_SCENARIOS,
};
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::DashboardConfig;
use crate::error::AppResult;
use crate::render::Renderer;

/// A user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Request the control lock.
    Acquire,
    /// Give the control lock back.
    Release,
    /// Trigger a named fault-injection scenario.
    Scenario(String),
    /// List the server's scenario catalogue.
    ListScenarios,
    /// Ask the server for the current lock state.
    Status,
    /// Print every panel.
    Show,
    /// End the session.
    Quit,
}

/// Unrecognised console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown command '{}' (acquire, release, scenario <name>, scenarios, status, show, quit)",
            self.0
        )
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for UiCommand {
    type Err = UnknownCommand;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut words = input.split_whitespace();
        let command = words.next().unwrap_or_default().to_lowercase();
        let arg = words.next();
        match (command.as_str(), arg) {
            ("acquire", None) => Ok(Self::Acquire),
            ("release", None) => Ok(Self::Release),
            ("scenario", Some(name)) => Ok(Self::Scenario(name.to_string())),
            ("scenarios", None) => Ok(Self::ListScenarios),
            ("status", None) => Ok(Self::Status),
            ("show", None) => Ok(Self::Show),
            ("quit" | "exit", None) => Ok(Self::Quit),
            _ => Err(UnknownCommand(input.trim().to_string())),
        }
    }
}

/// Network collaborators of a session.
#[derive(Clone)]
pub struct SessionBackends {
    /// Opens the telemetry stream.
    pub connector: Arc<dyn Connector>,
    /// Lock and scenario requests.
    pub control: Arc<dyn ControlApi>,
    /// Notification full-refresh queries.
    pub notifications: Arc<dyn NotificationSource>,
}

enum Outcome {
    Control(Feedback),
    Scenario(Feedback),
    Catalogue(dashboard_client::Result<Vec<ScenarioInfo>>),
    LockStatus(dashboard_client::Result<LockState>),
    Poll(dashboard_client::Result<Vec<Notification>>),
}

/// One running dashboard.
pub struct DashboardSession {
    supervisor: ConnectionSupervisor,
    view: TelemetryReconciler,
    scenario: ScenarioInvoker,
    backends: SessionBackends,
    renderer: Box<dyn Renderer>,
    feedback: Option<Feedback>,
    poll_interval: Duration,
    page_size: u32,
    poll_in_flight: bool,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
    outcome_rx: mpsc::UnboundedReceiver<Outcome>,
}

impl DashboardSession {
    /// Assemble a session from explicit parts.
    pub fn new(
        config: &DashboardConfig,
        telemetry_url: url::Url,
        identity: ClientIdentity,
        backends: SessionBackends,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            supervisor: ConnectionSupervisor::new(
                telemetry_url,
                config.reconnect_config(),
                Arc::clone(&backends.connector),
            ),
            view: TelemetryReconciler::new(identity.clone(), config.logs.max_entries),
            scenario: ScenarioInvoker::new(identity),
            backends,
            renderer,
            feedback: None,
            poll_interval: config.poll_interval(),
            page_size: config.notifications.page_size,
            poll_in_flight: false,
            outcome_tx,
            outcome_rx,
        }
    }

    /// Build a session talking to the configured server over HTTP and WebSocket.
    ///
    /// `base_url` (from the command line) overrides the configured address.
    pub fn from_config(
        config: &DashboardConfig,
        base_url: Option<&str>,
        renderer: Box<dyn Renderer>,
    ) -> AppResult<Self> {
        let address = dashboard_client::resolve_address(base_url, config.server.base_url.as_deref());
        tracing::info!(
            "Using server {} (from {})",
            address,
            address.source().label()
        );
        let endpoints = Endpoints::new(&address)?;
        let http = Arc::new(HttpApi::new(endpoints.clone(), config.request_timeout())?);

        let identity = match config.identity_storage_path() {
            Some(path) => ClientIdentity::load_or_create(&mut FileStorage::new(path))?,
            None => ClientIdentity::load_or_create(&mut MemoryStorage::default())?,
        };
        tracing::info!("Client identity {}", identity);

        let backends = SessionBackends {
            connector: Arc::new(WsConnector),
            control: http.clone(),
            notifications: http,
        };
        Ok(Self::new(
            config,
            endpoints.telemetry().clone(),
            identity,
            backends,
            renderer,
        ))
    }

    /// Reconciled view state.
    #[must_use]
    pub fn view(&self) -> &TelemetryReconciler {
        &self.view
    }

    /// Current connection status.
    #[must_use]
    pub fn connection_state(&self) -> &ConnectionState {
        self.supervisor.state()
    }

    /// Latest control feedback.
    #[must_use]
    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    /// Whether scenario controls are currently available.
    #[must_use]
    pub fn scenario_controls_enabled(&self) -> bool {
        self.scenario.controls_enabled()
    }

    /// Run until `Quit` arrives or the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<UiCommand>) -> AppResult<()> {
        self.supervisor.start();

        // First tick fires immediately, so the table is populated at startup.
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                update = self.supervisor.next_update() => match update {
                    Some(update) => self.on_supervisor_update(update),
                    None => break,
                },
                _ = poll.tick() => self.start_poll(),
                Some(outcome) = self.outcome_rx.recv() => self.on_outcome(outcome),
                command = commands.recv() => match command {
                    Some(UiCommand::Quit) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
        }

        tracing::info!("Dashboard session ended");
        Ok(())
    }

    fn on_supervisor_update(&mut self, update: SupervisorUpdate) {
        match update {
            SupervisorUpdate::Status(state) => self.renderer.status(&state),
            SupervisorUpdate::Snapshot(snapshot) => {
                let report = self.view.reconcile(&snapshot);
                if !report.is_empty() {
                    self.renderer.snapshot(&self.view, &report);
                }
            }
        }
    }

    fn on_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::Acquire => {
                let request = self.view.lock.acquire(Arc::clone(&self.backends.control));
                self.spawn_feedback(request, Outcome::Control);
            }
            UiCommand::Release => {
                let request = self.view.lock.release(Arc::clone(&self.backends.control));
                self.spawn_feedback(request, Outcome::Control);
            }
            UiCommand::Scenario(name) => {
                match self
                    .scenario
                    .begin(&name, Arc::clone(&self.backends.control))
                {
                    Ok((pending, request)) => {
                        self.show_feedback(pending);
                        self.spawn_feedback(request, Outcome::Scenario);
                    }
                    Err(busy) => {
                        tracing::debug!("{}", busy);
                        self.show_feedback(Feedback::error(format!(
                            "Wait for '{}' to finish",
                            busy.in_flight
                        )));
                    }
                }
            }
            UiCommand::ListScenarios => {
                let control = Arc::clone(&self.backends.control);
                let tx = self.outcome_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(Outcome::Catalogue(control.list_scenarios().await));
                });
            }
            UiCommand::Status => {
                let control = Arc::clone(&self.backends.control);
                let tx = self.outcome_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(Outcome::LockStatus(control.lock_status().await));
                });
            }
            UiCommand::Show => self.renderer.summary(self.supervisor.state(), &self.view),
            UiCommand::Quit => {}
        }
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Control(feedback) => self.show_feedback(feedback),
            Outcome::Scenario(feedback) => {
                let feedback = self.scenario.settle(feedback);
                self.show_feedback(feedback);
            }
            Outcome::Catalogue(Ok(scenarios)) => {
                let names: Vec<String> = scenarios
                    .iter()
                    .map(|s| format!("{} ({})", s.name, s.description))
                    .collect();
                self.show_feedback(Feedback::success(format!("Scenarios: {}", names.join(", "))));
            }
            Outcome::Catalogue(Err(e)) => {
                tracing::debug!("Scenario catalogue unavailable: {}", e);
                self.show_feedback(Feedback::success(format!(
                    "Scenarios: {}",
                    KNOWN_SCENARIOS.join(", ")
                )));
            }
            Outcome::LockStatus(Ok(state)) => {
                let view = LockView::derive(&state, self.view.lock.identity());
                self.show_feedback(Feedback::success(format!("Server lock state: {view}")));
            }
            Outcome::LockStatus(Err(e)) => {
                tracing::warn!("Lock status query failed: {}", e);
                self.show_feedback(Feedback::error(dashboard_client::feedback::NETWORK_ERROR_TEXT));
            }
            Outcome::Poll(result) => {
                self.poll_in_flight = false;
                match result {
                    Ok(records) => {
                        self.view.apply_poll(records);
                        self.renderer.notifications(&self.view.table);
                    }
                    Err(e) => tracing::debug!("Notification poll failed: {}", e),
                }
            }
        }
    }

    fn start_poll(&mut self) {
        if self.poll_in_flight {
            return;
        }
        self.poll_in_flight = true;
        let source = Arc::clone(&self.backends.notifications);
        let page_size = self.page_size;
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Outcome::Poll(source.query_notifications(page_size).await));
        });
    }

    fn spawn_feedback(
        &self,
        request: BoxFuture<'static, Feedback>,
        wrap: fn(Feedback) -> Outcome,
    ) {
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(wrap(request.await));
        });
    }

    fn show_feedback(&mut self, feedback: Feedback) {
        self.renderer.feedback(&feedback);
        self.feedback = Some(feedback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("acquire".parse(), Ok(UiCommand::Acquire));
        assert_eq!(" Release ".parse(), Ok(UiCommand::Release));
        assert_eq!(
            "scenario overcurrent".parse(),
            Ok(UiCommand::Scenario("overcurrent".into()))
        );
        assert_eq!("scenarios".parse(), Ok(UiCommand::ListScenarios));
        assert_eq!("exit".parse(), Ok(UiCommand::Quit));
        assert!("scenario".parse::<UiCommand>().is_err());
        assert!("acquire now".parse::<UiCommand>().is_err());
        assert!("".parse::<UiCommand>().is_err());
    }
}
