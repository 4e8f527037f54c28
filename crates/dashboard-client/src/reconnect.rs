//! Connection supervision and auto-reconnect with exponential backoff.
//!
//! The supervisor owns the single streaming connection to the telemetry
//! bridge. It never gives up: every close (graceful or not) schedules exactly
//! one reconnect, and the delay doubles up to a cap.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──start()──▶ Connecting ──open──▶ Connected
//!      ▲                        ▲                    │
//!      │                   timer fires          close/error
//!      │                        │                    ▼
//!      └──────────────── Reconnecting ◀──── (report Disconnected)
//! ```
//!
//! Transport errors are normalized into a close: the connection task drops
//! the stream and reports one `Closed` event, so there is a single code path
//! for both. Each supervised resource (the connection attempt and the
//! reconnect timer) has an explicit [`Slot`]; `start()` while either is busy
//! is a no-op.
//!
//! Frames are decoded into [`TelemetrySnapshot`]s. A frame that fails to
//! decode is dropped with a debug log and has no other effect.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::telemetry::TelemetrySnapshot;

/// Stream of text frames from one open connection. An `Err` item ends it.
pub type FrameStream = Pin<Box<dyn Stream<Item = crate::Result<String>> + Send>>;

/// Opens streaming connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &Url) -> crate::Result<FrameStream>;
}

/// Connection status shown by the status indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, no attempt pending.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Stream is open.
    Connected,
    /// Waiting for the reconnect timer.
    Reconnecting {
        /// Reconnect attempts since the last successful open (1-based).
        attempt: u32,
        /// Delay before this attempt.
        delay: Duration,
    },
}

impl ConnectionState {
    /// Returns a short status label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Reconnecting { .. } => "Reconnecting...",
        }
    }

    /// Returns true if connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Occupancy of one supervised resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Nothing outstanding.
    Idle,
    /// Started, outcome not known yet.
    Pending,
    /// Established and live.
    Active,
}

/// Configuration for auto-reconnect behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect after a successful open.
    pub base_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl ReconnectConfig {
    /// Delay that follows `current`: doubled, capped at `max_delay`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }

    /// Delays waited before each attempt for back-to-back failures.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.base_delay.min(self.max_delay)), |d| {
            Some(self.next_delay(*d))
        })
    }
}

/// Output of the supervisor, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorUpdate {
    /// Connection status changed.
    Status(ConnectionState),
    /// A frame decoded into a snapshot.
    Snapshot(Box<TelemetrySnapshot>),
}

#[derive(Debug)]
enum TransportEvent {
    Opened { generation: u64 },
    Frame { generation: u64, text: String },
    Closed { generation: u64, reason: Option<String> },
    TimerFired,
}

/// Owns the streaming connection and its reconnect cycle.
pub struct ConnectionSupervisor {
    url: Url,
    config: ReconnectConfig,
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    connection: Slot,
    timer: Slot,
    delay: Duration,
    attempt: u32,
    generation: u64,
    tx: mpsc::Sender<TransportEvent>,
    rx: mpsc::Receiver<TransportEvent>,
    pending: VecDeque<SupervisorUpdate>,
    connection_task: Option<JoinHandle<()>>,
    timer_task: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Create an idle supervisor for `url`.
    pub fn new(url: Url, config: ReconnectConfig, connector: Arc<dyn Connector>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let delay = config.base_delay.min(config.max_delay);
        Self {
            url,
            config,
            connector,
            state: ConnectionState::Disconnected,
            connection: Slot::Idle,
            timer: Slot::Idle,
            delay,
            attempt: 0,
            generation: 0,
            tx,
            rx,
            pending: VecDeque::new(),
            connection_task: None,
            timer_task: None,
        }
    }

    /// Current connection status.
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Delay the next scheduled reconnect will wait.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Connection attempt slot.
    #[must_use]
    pub fn connection_slot(&self) -> Slot {
        self.connection
    }

    /// Reconnect timer slot.
    #[must_use]
    pub fn timer_slot(&self) -> Slot {
        self.timer
    }

    /// Ensure a connection attempt exists.
    ///
    /// Returns `false` (and does nothing) if an attempt is pending, a
    /// connection is live, or a reconnect timer is pending.
    pub fn start(&mut self) -> bool {
        if self.connection != Slot::Idle || self.timer != Slot::Idle {
            tracing::trace!("start() ignored: attempt or timer already pending");
            return false;
        }

        self.generation += 1;
        self.connection = Slot::Pending;
        self.set_state(ConnectionState::Connecting);
        tracing::info!("Connecting to {}", self.url);

        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let tx = self.tx.clone();
        self.connection_task = Some(tokio::spawn(async move {
            run_connection(connector, url, generation, tx).await;
        }));
        true
    }

    /// Wait for the next status change or decoded snapshot.
    ///
    /// Cancel-safe; intended to be polled from a `select!` loop.
    pub async fn next_update(&mut self) -> Option<SupervisorUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }
            let event = self.rx.recv().await?;
            self.handle(event);
        }
    }

    fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened { generation } if generation == self.generation => {
                self.connection = Slot::Active;
                self.delay = self.config.base_delay.min(self.config.max_delay);
                self.attempt = 0;
                tracing::info!("Connected to {}", self.url);
                self.set_state(ConnectionState::Connected);
            }
            TransportEvent::Frame { generation, text } if generation == self.generation => {
                match TelemetrySnapshot::from_frame(&text) {
                    Ok(snapshot) => self.pending.push_back(SupervisorUpdate::Snapshot(Box::new(snapshot))),
                    Err(e) => tracing::debug!("Discarding malformed frame: {}", e),
                }
            }
            TransportEvent::Closed { generation, reason } if generation == self.generation => {
                self.connection = Slot::Idle;
                self.connection_task = None;
                match reason {
                    Some(reason) => tracing::info!("Connection to {} closed: {}", self.url, reason),
                    None => tracing::info!("Connection to {} closed", self.url),
                }
                self.set_state(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
            TransportEvent::TimerFired => {
                self.timer = Slot::Idle;
                self.timer_task = None;
                self.delay = self.config.next_delay(self.delay);
                self.start();
            }
            stale => tracing::trace!("Ignoring stale transport event {:?}", stale),
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.timer != Slot::Idle {
            return;
        }
        self.timer = Slot::Pending;
        self.attempt += 1;
        let delay = self.delay;
        tracing::info!(
            "Reconnect attempt {} in {:.1}s",
            self.attempt,
            delay.as_secs_f64()
        );
        self.set_state(ConnectionState::Reconnecting {
            attempt: self.attempt,
            delay,
        });

        let tx = self.tx.clone();
        self.timer_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TransportEvent::TimerFired).await;
        }));
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state.clone();
        self.pending.push_back(SupervisorUpdate::Status(state));
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
    }
}

async fn run_connection(
    connector: Arc<dyn Connector>,
    url: Url,
    generation: u64,
    tx: mpsc::Sender<TransportEvent>,
) {
    let mut stream = match connector.connect(&url).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx
                .send(TransportEvent::Closed {
                    generation,
                    reason: Some(e.to_string()),
                })
                .await;
            return;
        }
    };

    if tx.send(TransportEvent::Opened { generation }).await.is_err() {
        return;
    }

    let reason = loop {
        match stream.next().await {
            Some(Ok(text)) => {
                if tx
                    .send(TransportEvent::Frame { generation, text })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Some(Err(e)) => break Some(e.to_string()),
            None => break None,
        }
    };
    // Force-close before reporting so an errored transport and a graceful close look the same.
    drop(stream);
    let _ = tx.send(TransportEvent::Closed { generation, reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &Url) -> crate::Result<FrameStream> {
            Err(crate::ClientError::Connection("connection refused".into()))
        }
    }

    struct ScriptedConnector(Vec<crate::Result<String>>);

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _url: &Url) -> crate::Result<FrameStream> {
            let items: Vec<crate::Result<String>> = self
                .0
                .iter()
                .map(|r| match r {
                    Ok(s) => Ok(s.clone()),
                    Err(e) => Err(crate::ClientError::Connection(e.to_string())),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn url() -> Url {
        Url::parse("ws://127.0.0.1:9/ws/telemetry").unwrap()
    }

    #[test]
    fn test_backoff_schedule() {
        let config = ReconnectConfig::default();
        let ms: Vec<u128> = config.schedule().take(8).map(|d| d.as_millis()).collect();
        assert_eq!(
            ms,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ConnectionState::Disconnected.label(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.label(), "Connecting...");
        assert_eq!(ConnectionState::Connected.label(), "Connected");
        assert_eq!(
            ConnectionState::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .label(),
            "Reconnecting..."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_refusals_follow_backoff() {
        let mut sup = ConnectionSupervisor::new(
            url(),
            ReconnectConfig::default(),
            Arc::new(RefusingConnector),
        );
        assert!(sup.start());
        assert!(!sup.start());

        let mut delays = Vec::new();
        while delays.len() < 7 {
            match sup.next_update().await.unwrap() {
                SupervisorUpdate::Status(ConnectionState::Reconnecting { delay, .. }) => {
                    assert!(!sup.start(), "timer pending, start must be a no-op");
                    delays.push(delay.as_millis());
                }
                SupervisorUpdate::Status(_) => {}
                SupervisorUpdate::Snapshot(_) => panic!("no frames expected"),
            }
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_sequence_and_frames() {
        let connector = ScriptedConnector(vec![
            Ok(r#"{"motor":{"rpm":10}}"#.to_string()),
            Ok("garbage".to_string()),
            Ok(r#"{"motor":{"rpm":20}}"#.to_string()),
            Err(crate::ClientError::Connection("reset by peer".into())),
        ]);
        let mut sup =
            ConnectionSupervisor::new(url(), ReconnectConfig::default(), Arc::new(connector));
        sup.start();

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(sup.next_update().await.unwrap());
        }
        let rpm = |u: &SupervisorUpdate| match u {
            SupervisorUpdate::Snapshot(s) => s.motor.as_ref().map(|m| m.rpm),
            _ => None,
        };
        assert_eq!(seen[0], SupervisorUpdate::Status(ConnectionState::Connecting));
        assert_eq!(seen[1], SupervisorUpdate::Status(ConnectionState::Connected));
        assert_eq!(rpm(&seen[2]), Some(10));
        assert_eq!(rpm(&seen[3]), Some(20));
        assert_eq!(seen[4], SupervisorUpdate::Status(ConnectionState::Disconnected));
        assert_eq!(
            seen[5],
            SupervisorUpdate::Status(ConnectionState::Reconnecting {
                attempt: 1,
                delay: Duration::from_millis(1000)
            })
        );
        assert_eq!(sup.timer_slot(), Slot::Pending);
        assert_eq!(sup.connection_slot(), Slot::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_open_resets_backoff() {
        let connector = ScriptedConnector(Vec::new());
        let mut sup =
            ConnectionSupervisor::new(url(), ReconnectConfig::default(), Arc::new(connector));
        sup.start();

        // Every connection opens and then closes at once; the delay never grows.
        let mut delays = Vec::new();
        while delays.len() < 4 {
            if let Some(SupervisorUpdate::Status(ConnectionState::Reconnecting { delay, attempt })) =
                sup.next_update().await
            {
                assert_eq!(attempt, 1);
                delays.push(delay.as_millis());
            }
        }
        assert_eq!(delays, vec![1000, 1000, 1000, 1000]);
    }
}
