//! Telemetry snapshot wire types.
//!
//! One [`TelemetrySnapshot`] arrives per streamed frame. Every section is
//! optional: an absent section means "no change this tick", never "clear".
//! Sections decode independently, so a malformed `motor` never costs the
//! frame its `control` or log batches. Inside a section, fields that are
//! missing or unusable decode to zero, which is how the bridge itself fills
//! gaps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lenient;
use crate::log_stream::{CanLogEntry, EventEntry};
use crate::notifications::Notification;

/// Point-in-time aggregate delivered by the telemetry bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Bridge statistics.
    pub stats: Option<Stats>,
    /// Vehicle state manager output.
    pub vehicle: Option<Vehicle>,
    /// Traction motor.
    pub motor: Option<Motor>,
    /// Steering actuator.
    pub steering: Option<Steering>,
    /// Brake actuator.
    pub brake: Option<Brake>,
    /// Battery pack.
    pub battery: Option<Battery>,
    /// Forward lidar.
    pub lidar: Option<Lidar>,
    /// ECU heartbeat liveness.
    pub heartbeats: Option<Heartbeats>,
    /// Anomaly detector output.
    pub anomaly: Option<Anomaly>,
    /// Control-lock arbitration state.
    pub control: Option<LockState>,
    /// CAN frame log batch.
    pub can_log: Option<Vec<CanLogEntry>>,
    /// System event log batch.
    pub events: Option<Vec<EventEntry>>,
    /// Quality notification batch.
    pub sap_notifications: Option<Vec<Notification>>,
}

impl TelemetrySnapshot {
    /// Decode one streamed frame.
    ///
    /// Fails only when the frame is not a JSON object. A section that does
    /// not decode is treated as absent; a batch keeps its decodable entries.
    pub fn from_frame(text: &str) -> crate::Result<Self> {
        let mut root: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self {
            stats: section(&mut root, "stats"),
            vehicle: section(&mut root, "vehicle"),
            motor: section(&mut root, "motor"),
            steering: section(&mut root, "steering"),
            brake: section(&mut root, "brake"),
            battery: section(&mut root, "battery"),
            lidar: section(&mut root, "lidar"),
            heartbeats: section(&mut root, "heartbeats"),
            anomaly: section(&mut root, "anomaly"),
            control: section(&mut root, "control"),
            can_log: root.remove("can_log").and_then(lenient::each),
            events: root.remove("events").and_then(lenient::each),
            sap_notifications: root
                .remove("sap_notifications")
                .or_else(|| root.remove("notifications"))
                .and_then(lenient::each),
        })
    }
}

fn section<T: DeserializeOwned>(root: &mut Map<String, Value>, key: &str) -> Option<T> {
    match root.remove(key)? {
        Value::Null => None,
        value => match serde_json::from_value(value) {
            Ok(section) => Some(section),
            Err(e) => {
                tracing::debug!("Discarding malformed '{}' section: {}", key, e);
                None
            }
        },
    }
}

/// Bridge statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// Seconds since the bridge started.
    #[serde(deserialize_with = "lenient::int")]
    pub uptime_sec: u64,
    /// CAN messages per second.
    #[serde(alias = "rate", deserialize_with = "lenient::int")]
    pub can_msgs_sec: u64,
}

/// Vehicle state manager output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vehicle {
    /// Index into the vehicle state table.
    #[serde(deserialize_with = "lenient::int")]
    pub state: i64,
    /// Server-provided name for `state`, preferred when present.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub state_name: Option<String>,
    /// Active fault bitmask.
    #[serde(deserialize_with = "lenient::int")]
    pub fault_mask: u32,
    /// Torque limit in percent.
    #[serde(deserialize_with = "lenient::opt_int")]
    pub torque_limit: Option<i64>,
    /// Speed limit in percent.
    #[serde(deserialize_with = "lenient::opt_int")]
    pub speed_limit: Option<i64>,
}

/// Traction motor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Motor {
    /// Shaft speed.
    #[serde(deserialize_with = "lenient::int")]
    pub rpm: i64,
    /// Phase current.
    #[serde(deserialize_with = "lenient::int")]
    pub current_ma: i64,
    /// Winding temperature 1.
    #[serde(deserialize_with = "lenient::int")]
    pub temp_c: i64,
    /// Winding temperature 2.
    #[serde(deserialize_with = "lenient::int")]
    pub temp2_c: i64,
    /// PWM duty.
    #[serde(deserialize_with = "lenient::int")]
    pub duty_pct: i64,
    /// Fault status code, zero when healthy.
    #[serde(deserialize_with = "lenient::int")]
    pub faults: i64,
}

/// Steering actuator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Steering {
    /// Measured angle.
    #[serde(deserialize_with = "lenient::opt_float")]
    pub actual_deg: Option<f64>,
    /// Commanded angle.
    #[serde(deserialize_with = "lenient::opt_float")]
    pub commanded_deg: Option<f64>,
    /// Servo current.
    #[serde(deserialize_with = "lenient::int")]
    pub servo_ma: i64,
    /// Fault status, zero when healthy.
    #[serde(deserialize_with = "lenient::int")]
    pub fault: i64,
}

/// Brake actuator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brake {
    /// Measured position.
    #[serde(deserialize_with = "lenient::int")]
    pub position_pct: i64,
    /// Commanded position.
    #[serde(deserialize_with = "lenient::int")]
    pub commanded_pct: i64,
    /// Servo current.
    #[serde(deserialize_with = "lenient::int")]
    pub servo_ma: i64,
    /// Fault status, zero when healthy.
    #[serde(deserialize_with = "lenient::int")]
    pub fault: i64,
}

/// Battery pack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Battery {
    /// Pack voltage.
    #[serde(deserialize_with = "lenient::int")]
    pub voltage_mv: i64,
    /// State of charge.
    #[serde(deserialize_with = "lenient::int")]
    pub soc_pct: i64,
    /// Index into the battery status table.
    #[serde(deserialize_with = "lenient::int")]
    pub status: i64,
}

/// Forward lidar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lidar {
    /// Distance to the nearest obstacle.
    #[serde(deserialize_with = "lenient::int")]
    pub distance_cm: i64,
    /// Obstacle zone.
    #[serde(deserialize_with = "lenient::opt_int")]
    pub zone: Option<i64>,
    /// Return signal strength.
    #[serde(deserialize_with = "lenient::int")]
    pub signal_strength: i64,
}

/// ECU heartbeat liveness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heartbeats {
    /// Central vehicle controller.
    #[serde(deserialize_with = "lenient::flag")]
    pub cvc: bool,
    /// Front zone controller.
    #[serde(deserialize_with = "lenient::flag")]
    pub fzc: bool,
    /// Rear zone controller.
    #[serde(deserialize_with = "lenient::flag")]
    pub rzc: bool,
}

/// Anomaly detector output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anomaly {
    /// Score in `0.0..=1.0`.
    #[serde(deserialize_with = "lenient::float")]
    pub score: f64,
    /// Detector alert flag.
    #[serde(deserialize_with = "lenient::flag")]
    pub alert: bool,
}

/// Control-lock state as published by the arbitration server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockState {
    /// Whether anyone holds the lock.
    #[serde(deserialize_with = "lenient::flag")]
    pub locked: bool,
    /// Identity of the holder, empty when unlocked.
    #[serde(alias = "holder_identity", deserialize_with = "lenient::text")]
    pub client_id: String,
    /// Seconds until the lock expires.
    #[serde(alias = "remaining_seconds", deserialize_with = "lenient::float")]
    pub remaining_sec: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_sections_stay_none() {
        let snap = TelemetrySnapshot::from_frame(r#"{"motor":{"rpm":1200}}"#).unwrap();
        assert_eq!(snap.motor.as_ref().map(|m| m.rpm), Some(1200));
        assert_eq!(snap.motor.as_ref().map(|m| m.temp_c), Some(0));
        assert!(snap.vehicle.is_none());
        assert!(snap.control.is_none());
        assert!(snap.can_log.is_none());
    }

    #[test]
    fn test_field_aliases() {
        let snap = TelemetrySnapshot::from_frame(
            r#"{"stats":{"uptime_sec":5,"rate":42},
                "control":{"locked":true,"holder_identity":"web-abc123","remaining_sec":45},
                "notifications":[{"notification_id":"QN-00001"}]}"#,
        )
        .unwrap();
        assert_eq!(snap.stats.unwrap().can_msgs_sec, 42);
        let control = snap.control.unwrap();
        assert_eq!(control.client_id, "web-abc123");
        assert_eq!(control.remaining_sec, 45.0);
        assert_eq!(snap.sap_notifications.unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let snap = TelemetrySnapshot::from_frame(
            r#"{"ts":1.5,"motor":{"rpm":1,"derating":100},"lidar":{"sensor_status":0}}"#,
        )
        .unwrap();
        assert!(snap.motor.is_some());
        assert!(snap.lidar.is_some());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(TelemetrySnapshot::from_frame("{not json").is_err());
        assert!(TelemetrySnapshot::from_frame("[1, 2]").is_err());
    }

    #[test]
    fn test_bad_section_keeps_the_rest_of_the_frame() {
        let snap = TelemetrySnapshot::from_frame(
            r#"{"motor":"hot",
                "battery":[1,2,3],
                "control":{"locked":true,"client_id":"web-abc123","remaining_sec":45},
                "events":[{"ts":1.0,"type":"fault","msg":"Overcurrent"}],
                "can_log":[{"ts":1.0,"msg_name":"Motor_Status","sender":"RZC"}]}"#,
        )
        .unwrap();
        assert!(snap.motor.is_none());
        assert!(snap.battery.is_none());
        assert_eq!(snap.control.unwrap().client_id, "web-abc123");
        assert_eq!(snap.events.unwrap()[0].msg, "Overcurrent");
        assert_eq!(snap.can_log.unwrap().len(), 1);
    }

    #[test]
    fn test_loosely_typed_fields_are_coerced() {
        let snap = TelemetrySnapshot::from_frame(
            r#"{"motor":{"rpm":1200.5,"temp_c":null,"faults":"2"},
                "vehicle":{"state":1.0,"fault_mask":3,"torque_limit":null},
                "heartbeats":{"cvc":1,"fzc":0,"rzc":null},
                "control":{"locked":true,"client_id":null,"remaining_sec":"30"},
                "events":[{"ts":2,"type":"state","msg":"RUN"},"junk"],
                "sap_notifications":[{"notification_id":"QN-1","priority":1}]}"#,
        )
        .unwrap();
        let motor = snap.motor.unwrap();
        assert_eq!((motor.rpm, motor.temp_c, motor.faults), (1200, 0, 2));
        let vehicle = snap.vehicle.unwrap();
        assert_eq!((vehicle.state, vehicle.torque_limit), (1, None));
        assert_eq!(
            snap.heartbeats,
            Some(Heartbeats { cvc: true, fzc: false, rzc: false })
        );
        let control = snap.control.unwrap();
        assert_eq!(control.client_id, "");
        assert_eq!(control.remaining_sec, 30.0);
        assert_eq!(snap.events.unwrap().len(), 1);
        let notes = snap.sap_notifications.unwrap();
        assert_eq!(notes[0].priority.as_deref(), Some("1"));
    }

    #[test]
    fn test_null_section_is_absent() {
        let snap = TelemetrySnapshot::from_frame(r#"{"motor":null,"events":null}"#).unwrap();
        assert!(snap.motor.is_none());
        assert!(snap.events.is_none());
    }
}
