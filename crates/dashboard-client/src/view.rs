//! View models and the per-subsystem telemetry update functions.
//!
//! A frame's sections are independent. Each subsystem has its own `apply_*`
//! function taking the optional section; `None` is a no-op for that function
//! alone. [`TelemetryReconciler`] just calls all of them in turn.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

use crate::identity::ClientIdentity;
use crate::lock::ControlLockClient;
use crate::log_stream::{CanLogEntry, EventEntry, LogStreamMerger};
use crate::notifications::{Notification, NotificationReconciler};
use crate::telemetry::{
    Anomaly, Battery, Brake, Heartbeats, Lidar, Motor, Stats, Steering, TelemetrySnapshot, Vehicle,
};

/// Vehicle state names indexed by `vehicle.state`.
pub const STATE_NAMES: [&str; 6] = ["INIT", "RUN", "DEGRADED", "LIMP", "SAFE_STOP", "SHUTDOWN"];

/// Battery status names indexed by `battery.status`.
pub const BATTERY_STATUS_NAMES: [&str; 5] = ["CRITICAL", "LOW", "NOMINAL", "OV_WARN", "OV_CRITICAL"];

/// Name for an out-of-table code.
pub const UNKNOWN: &str = "UNKNOWN";

/// Placeholder for a missing value.
pub const PLACEHOLDER: &str = "--";

const MOTOR_TEMP_WARN_C: i64 = 60;
const MOTOR_TEMP_FAULT_C: i64 = 80;
const BATTERY_LOW_SOC_PCT: i64 = 20;
const DEFAULT_PRIORITY: &str = "3";

/// Highlight level of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// In range.
    #[default]
    Normal,
    /// Approaching a limit.
    Warn,
    /// Past a limit.
    Fault,
}

/// Binary fault indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultIndicator {
    /// No fault.
    #[default]
    Ok,
    /// Fault latched.
    Fault,
}

impl FaultIndicator {
    fn from_flag(flag: bool) -> Self {
        if flag {
            Self::Fault
        } else {
            Self::Ok
        }
    }

    /// Display text.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Fault => "FAULT",
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// `HH:MM:SS` for a duration in seconds. Hours are not wrapped.
#[must_use]
pub fn format_uptime(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Vehicle state name, preferring the server-provided name.
#[must_use]
pub fn state_name(vehicle: &Vehicle) -> String {
    if let Some(name) = vehicle.state_name.as_deref().filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    table_lookup(&STATE_NAMES, vehicle.state).to_string()
}

/// Battery status name for a status code.
#[must_use]
pub fn battery_status_name(code: i64) -> &'static str {
    table_lookup(&BATTERY_STATUS_NAMES, code)
}

fn table_lookup(table: &[&'static str], index: i64) -> &'static str {
    usize::try_from(index)
        .ok()
        .and_then(|i| table.get(i).copied())
        .unwrap_or(UNKNOWN)
}

/// `0x` followed by at least four upper-case hex digits.
#[must_use]
pub fn format_fault_mask(mask: u32) -> String {
    format!("0x{mask:04X}")
}

/// `"<n>%"`, or the placeholder when absent.
#[must_use]
pub fn format_limit(limit: Option<i64>) -> String {
    limit.map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{v}%"))
}

fn format_degrees(value: Option<f64>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{v:.1}"))
}

/// Local wall-clock `HH:MM:SS` for a Unix timestamp in seconds.
#[must_use]
pub fn format_log_time(ts: f64) -> String {
    if !ts.is_finite() {
        return "--:--:--".to_string();
    }
    let millis = (ts * 1000.0).floor() as i64;
    match Local.timestamp_millis_opt(millis).single() {
        Some(time) => time.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Local date and time for an ISO-8601 creation stamp.
///
/// Stamps with an offset are converted to local time; naive stamps are
/// taken as UTC. Anything unparseable is shown verbatim.
#[must_use]
pub fn format_created(created_at: Option<&str>) -> String {
    let Some(raw) = created_at.filter(|s| !s.is_empty()) else {
        return PLACEHOLDER.to_string();
    };
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive
            .and_utc()
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
    }
    raw.to_string()
}

// =============================================================================
// Subsystem views
// =============================================================================

/// Bridge statistics panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsView {
    /// `HH:MM:SS`.
    pub uptime: String,
    /// `"<n> msg/s"`.
    pub rate: String,
}

/// Vehicle state panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleView {
    /// Raw state index.
    pub state: i64,
    /// Resolved state name.
    pub state_name: String,
    /// Formatted fault mask.
    pub fault_mask: String,
    /// Torque limit text.
    pub torque_limit: String,
    /// Speed limit text.
    pub speed_limit: String,
}

/// Traction motor panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorView {
    /// Shaft speed.
    pub rpm: i64,
    /// Phase current in mA.
    pub current_ma: i64,
    /// Winding temperature 1 in °C.
    pub temp_c: i64,
    /// Winding temperature 2 in °C.
    pub temp2_c: i64,
    /// PWM duty in percent.
    pub duty_pct: i64,
    /// Fault status code.
    pub faults: i64,
    /// Highlight for `temp_c`.
    pub temp_severity: Severity,
    /// Highlight for `faults`.
    pub fault_severity: Severity,
}

/// Steering panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteeringView {
    /// Actual angle, one decimal.
    pub actual_deg: String,
    /// Commanded angle, one decimal.
    pub commanded_deg: String,
    /// Servo current in mA.
    pub servo_ma: i64,
    /// Fault flag.
    pub status: FaultIndicator,
}

/// Brake panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrakeView {
    /// Measured position in percent.
    pub position_pct: i64,
    /// Commanded position in percent.
    pub commanded_pct: i64,
    /// Servo current in mA.
    pub servo_ma: i64,
    /// Fault flag.
    pub status: FaultIndicator,
}

/// Battery panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryView {
    /// Volts, two decimals.
    pub voltage: String,
    /// State of charge in percent.
    pub soc_pct: i64,
    /// Status table name.
    pub status: &'static str,
    /// State of charge below the low threshold.
    pub low: bool,
}

/// Lidar panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LidarView {
    /// Distance to the nearest obstacle.
    pub distance_cm: i64,
    /// Zone index, or placeholder.
    pub zone: String,
    /// Return signal strength.
    pub signal_strength: i64,
}

/// ECU heartbeat panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatView {
    /// Central vehicle controller alive.
    pub cvc: bool,
    /// Front zone controller alive.
    pub fzc: bool,
    /// Rear zone controller alive.
    pub rzc: bool,
}

impl HeartbeatView {
    /// Named channels in display order.
    #[must_use]
    pub fn channels(&self) -> [(&'static str, bool); 3] {
        [("CVC", self.cvc), ("FZC", self.fzc), ("RZC", self.rzc)]
    }
}

/// Anomaly detector panel.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyView {
    /// Score, two decimals.
    pub score: String,
    /// Detector alert flag.
    pub alert: bool,
    /// Bar fill in percent, `min(score * 100, 100)`.
    pub bar_pct: f64,
}

/// Category of a rendered log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogClass {
    /// CAN frame.
    Can,
    /// `fault` or `dtc` event.
    Fault,
    /// `state` or `anomaly` event.
    State,
    /// `sap` event.
    Sap,
    /// Anything else.
    Info,
}

impl LogClass {
    /// Classify an event type.
    #[must_use]
    pub fn for_event(kind: &str) -> Self {
        match kind {
            "fault" | "dtc" => Self::Fault,
            "state" | "anomaly" => Self::State,
            "sap" => Self::Sap,
            _ => Self::Info,
        }
    }
}

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Local `HH:MM:SS`.
    pub time: String,
    /// Highlight class.
    pub class: LogClass,
    /// Rendered line text.
    pub text: String,
}

/// Render a CAN log entry as `name [sender] signals`.
#[must_use]
pub fn render_can_line(entry: &CanLogEntry) -> LogLine {
    let name = entry
        .msg_name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| {
            entry.msg_id.as_ref().map(|id| match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
        .unwrap_or_default();
    let mut text = format!("{name} [{}]", entry.sender);
    if let Some(signals) = entry.signals.as_ref().filter(|s| !s.is_null()) {
        text.push(' ');
        text.push_str(&signals.to_string());
    }
    LogLine {
        time: format_log_time(entry.ts),
        class: LogClass::Can,
        text,
    }
}

/// Render a system event entry.
#[must_use]
pub fn render_event_line(entry: &EventEntry) -> LogLine {
    LogLine {
        time: format_log_time(entry.ts),
        class: LogClass::for_event(&entry.kind),
        text: entry.msg.clone(),
    }
}

/// One row of the notification table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRow {
    /// Notification id.
    pub id: String,
    /// Originating DTC, or empty.
    pub dtc_code: String,
    /// Description, or defect text when no description is present.
    pub description: String,
    /// Plant code, or empty.
    pub plant: String,
    /// Raw priority, possibly empty.
    pub priority: String,
    /// Priority used for styling; defaults to `3`.
    pub priority_class: String,
    /// Upper-cased status.
    pub status: String,
    /// Local creation time, or placeholder.
    pub created: String,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        let priority = text(&n.priority);
        Self {
            id: n.notification_id.clone(),
            dtc_code: text(&n.dtc_code),
            description: n
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .or_else(|| n.defect_text.clone())
                .unwrap_or_default(),
            plant: text(&n.plant),
            priority_class: if priority.is_empty() {
                DEFAULT_PRIORITY.to_string()
            } else {
                priority.clone()
            },
            priority,
            status: text(&n.status).to_uppercase(),
            created: format_created(n.created_at.as_deref()),
        }
    }
}

/// Rendered notification table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NotificationTable {
    /// Explicit empty-state placeholder.
    #[default]
    Empty,
    /// One row per stored record, in store order.
    Rows(Vec<NotificationRow>),
}

impl NotificationTable {
    /// Render the whole table from the store.
    #[must_use]
    pub fn render(records: &[Notification]) -> Self {
        if records.is_empty() {
            Self::Empty
        } else {
            Self::Rows(records.iter().map(NotificationRow::from).collect())
        }
    }

    /// Rows, empty for the placeholder.
    #[must_use]
    pub fn rows(&self) -> &[NotificationRow] {
        match self {
            Self::Empty => &[],
            Self::Rows(rows) => rows,
        }
    }
}

// =============================================================================
// Independent update functions
// =============================================================================

fn replace_if_present<S, V: PartialEq>(
    slot: &mut Option<V>,
    section: Option<&S>,
    build: impl FnOnce(&S) -> V,
) -> bool {
    let Some(section) = section else {
        return false;
    };
    let view = build(section);
    if slot.as_ref() == Some(&view) {
        return false;
    }
    *slot = Some(view);
    true
}

/// Update the statistics panel.
pub fn apply_stats(view: &mut Option<StatsView>, section: Option<&Stats>) -> bool {
    replace_if_present(view, section, |s| StatsView {
        uptime: format_uptime(s.uptime_sec),
        rate: format!("{} msg/s", s.can_msgs_sec),
    })
}

/// Update the vehicle panel.
pub fn apply_vehicle(view: &mut Option<VehicleView>, section: Option<&Vehicle>) -> bool {
    replace_if_present(view, section, |v| VehicleView {
        state: v.state,
        state_name: state_name(v),
        fault_mask: format_fault_mask(v.fault_mask),
        torque_limit: format_limit(v.torque_limit),
        speed_limit: format_limit(v.speed_limit),
    })
}

/// Update the motor panel.
pub fn apply_motor(view: &mut Option<MotorView>, section: Option<&Motor>) -> bool {
    replace_if_present(view, section, |m| MotorView {
        rpm: m.rpm,
        current_ma: m.current_ma,
        temp_c: m.temp_c,
        temp2_c: m.temp2_c,
        duty_pct: m.duty_pct,
        faults: m.faults,
        temp_severity: if m.temp_c > MOTOR_TEMP_FAULT_C {
            Severity::Fault
        } else if m.temp_c > MOTOR_TEMP_WARN_C {
            Severity::Warn
        } else {
            Severity::Normal
        },
        fault_severity: if m.faults > 0 {
            Severity::Fault
        } else {
            Severity::Normal
        },
    })
}

/// Update the steering panel.
pub fn apply_steering(view: &mut Option<SteeringView>, section: Option<&Steering>) -> bool {
    replace_if_present(view, section, |s| SteeringView {
        actual_deg: format_degrees(s.actual_deg),
        commanded_deg: format_degrees(s.commanded_deg),
        servo_ma: s.servo_ma,
        status: FaultIndicator::from_flag(s.fault != 0),
    })
}

/// Update the brake panel.
pub fn apply_brake(view: &mut Option<BrakeView>, section: Option<&Brake>) -> bool {
    replace_if_present(view, section, |b| BrakeView {
        position_pct: b.position_pct,
        commanded_pct: b.commanded_pct,
        servo_ma: b.servo_ma,
        status: FaultIndicator::from_flag(b.fault != 0),
    })
}

/// Update the battery panel.
pub fn apply_battery(view: &mut Option<BatteryView>, section: Option<&Battery>) -> bool {
    replace_if_present(view, section, |b| BatteryView {
        voltage: format!("{:.2}", b.voltage_mv as f64 / 1000.0),
        soc_pct: b.soc_pct,
        status: battery_status_name(b.status),
        low: b.soc_pct < BATTERY_LOW_SOC_PCT,
    })
}

/// Update the lidar panel.
pub fn apply_lidar(view: &mut Option<LidarView>, section: Option<&Lidar>) -> bool {
    replace_if_present(view, section, |l| LidarView {
        distance_cm: l.distance_cm,
        zone: l
            .zone
            .map_or_else(|| PLACEHOLDER.to_string(), |z| z.to_string()),
        signal_strength: l.signal_strength,
    })
}

/// Update the heartbeat panel.
pub fn apply_heartbeats(view: &mut Option<HeartbeatView>, section: Option<&Heartbeats>) -> bool {
    replace_if_present(view, section, |h| HeartbeatView {
        cvc: h.cvc,
        fzc: h.fzc,
        rzc: h.rzc,
    })
}

/// Update the anomaly panel.
pub fn apply_anomaly(view: &mut Option<AnomalyView>, section: Option<&Anomaly>) -> bool {
    replace_if_present(view, section, |a| AnomalyView {
        score: format!("{:.2}", a.score),
        alert: a.alert,
        bar_pct: (a.score * 100.0).clamp(0.0, 100.0),
    })
}

/// Merge a CAN log batch; returns the newly rendered lines.
pub fn apply_can_log(
    merger: &mut LogStreamMerger<CanLogEntry>,
    section: Option<&[CanLogEntry]>,
) -> Vec<LogLine> {
    let Some(batch) = section else {
        return Vec::new();
    };
    let report = merger.merge(batch);
    merger.newest(report.appended).map(render_can_line).collect()
}

/// Merge an event log batch; returns the newly rendered lines.
pub fn apply_events(
    merger: &mut LogStreamMerger<EventEntry>,
    section: Option<&[EventEntry]>,
) -> Vec<LogLine> {
    let Some(batch) = section else {
        return Vec::new();
    };
    let report = merger.merge(batch);
    merger.newest(report.appended).map(render_event_line).collect()
}

/// Merge a streamed notification batch and re-render the table.
///
/// An absent or empty batch leaves both untouched.
pub fn apply_notifications(
    store: &mut NotificationReconciler,
    table: &mut NotificationTable,
    section: Option<&[Notification]>,
) -> bool {
    let Some(batch) = section.filter(|b| !b.is_empty()) else {
        return false;
    };
    store.apply_batch(batch);
    *table = NotificationTable::render(store.records());
    true
}

// =============================================================================
// TelemetryReconciler
// =============================================================================

/// What one snapshot changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Number of metric panels whose view changed.
    pub panels_changed: usize,
    /// Lock display changed.
    pub lock_changed: bool,
    /// Notification table was re-rendered.
    pub notifications_changed: bool,
    /// CAN lines appended by this snapshot.
    pub can_lines: Vec<LogLine>,
    /// Event lines appended by this snapshot.
    pub event_lines: Vec<LogLine>,
}

impl ReconcileReport {
    /// Whether anything visible changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels_changed == 0
            && !self.lock_changed
            && !self.notifications_changed
            && self.can_lines.is_empty()
            && self.event_lines.is_empty()
    }
}

/// All view state of one dashboard session.
#[derive(Debug)]
pub struct TelemetryReconciler {
    /// Statistics panel.
    pub stats: Option<StatsView>,
    /// Vehicle panel.
    pub vehicle: Option<VehicleView>,
    /// Motor panel.
    pub motor: Option<MotorView>,
    /// Steering panel.
    pub steering: Option<SteeringView>,
    /// Brake panel.
    pub brake: Option<BrakeView>,
    /// Battery panel.
    pub battery: Option<BatteryView>,
    /// Lidar panel.
    pub lidar: Option<LidarView>,
    /// Heartbeat panel.
    pub heartbeats: Option<HeartbeatView>,
    /// Anomaly panel.
    pub anomaly: Option<AnomalyView>,
    /// CAN frame log.
    pub can_log: LogStreamMerger<CanLogEntry>,
    /// System event log.
    pub events: LogStreamMerger<EventEntry>,
    /// Notification store.
    pub notifications: NotificationReconciler,
    /// Rendered notification table.
    pub table: NotificationTable,
    /// Lock display.
    pub lock: ControlLockClient,
}

impl TelemetryReconciler {
    /// Empty views; both log streams retain up to `max_log_entries`.
    pub fn new(identity: ClientIdentity, max_log_entries: usize) -> Self {
        Self {
            stats: None,
            vehicle: None,
            motor: None,
            steering: None,
            brake: None,
            battery: None,
            lidar: None,
            heartbeats: None,
            anomaly: None,
            can_log: LogStreamMerger::new(max_log_entries),
            events: LogStreamMerger::new(max_log_entries),
            notifications: NotificationReconciler::new(),
            table: NotificationTable::Empty,
            lock: ControlLockClient::new(identity),
        }
    }

    /// Fan a snapshot out to every subsystem.
    pub fn reconcile(&mut self, snapshot: &TelemetrySnapshot) -> ReconcileReport {
        let panels = [
            apply_stats(&mut self.stats, snapshot.stats.as_ref()),
            apply_vehicle(&mut self.vehicle, snapshot.vehicle.as_ref()),
            apply_motor(&mut self.motor, snapshot.motor.as_ref()),
            apply_steering(&mut self.steering, snapshot.steering.as_ref()),
            apply_brake(&mut self.brake, snapshot.brake.as_ref()),
            apply_battery(&mut self.battery, snapshot.battery.as_ref()),
            apply_lidar(&mut self.lidar, snapshot.lidar.as_ref()),
            apply_heartbeats(&mut self.heartbeats, snapshot.heartbeats.as_ref()),
            apply_anomaly(&mut self.anomaly, snapshot.anomaly.as_ref()),
        ];
        ReconcileReport {
            panels_changed: panels.iter().filter(|changed| **changed).count(),
            lock_changed: self.lock.apply(snapshot.control.as_ref()),
            notifications_changed: apply_notifications(
                &mut self.notifications,
                &mut self.table,
                snapshot.sap_notifications.as_deref(),
            ),
            can_lines: apply_can_log(&mut self.can_log, snapshot.can_log.as_deref()),
            event_lines: apply_events(&mut self.events, snapshot.events.as_deref()),
        }
    }

    /// Replace the notification store with a poll result and re-render.
    pub fn apply_poll(&mut self, records: Vec<Notification>) {
        self.notifications.replace_all(records);
        self.table = NotificationTable::render(self.notifications.records());
    }
}
