//! Console presentation of the dashboard.
//!
//! The session tells a [`Renderer`] what changed; the renderer decides how to
//! show it. [`ConsoleRenderer`] writes plain text lines: status changes, new
//! log lines, lock changes, feedback, and on request a full panel summary.

use std::io::Write;

use dashboard_client::view::{LogClass, LogLine, Severity};
use dashboard_client::{
    ConnectionState, Feedback, FeedbackKind, NotificationTable, ReconcileReport,
    TelemetryReconciler,
};

/// Presentation surface driven by the session.
pub trait Renderer: Send {
    /// Connection status changed.
    fn status(&mut self, state: &ConnectionState);

    /// A snapshot was reconciled.
    fn snapshot(&mut self, view: &TelemetryReconciler, report: &ReconcileReport);

    /// The notification table was re-rendered by a full refresh.
    fn notifications(&mut self, table: &NotificationTable);

    /// Control feedback changed.
    fn feedback(&mut self, feedback: &Feedback);

    /// Full panel summary on request.
    fn summary(&mut self, state: &ConnectionState, view: &TelemetryReconciler);
}

/// Line-oriented renderer over any writer.
pub struct ConsoleRenderer<W> {
    out: W,
}

impl<W: Write + Send> ConsoleRenderer<W> {
    /// Render to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the renderer, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            tracing::debug!("console write failed: {}", e);
        }
    }

    fn log_line(&mut self, prefix: &str, line: &LogLine) {
        let tag = match line.class {
            LogClass::Can => "",
            LogClass::Fault => " FAULT",
            LogClass::State => " STATE",
            LogClass::Sap => " SAP",
            LogClass::Info => " INFO",
        };
        self.line(&format!("{} {prefix}{tag} {}", line.time, line.text));
    }

    fn table(&mut self, table: &NotificationTable) {
        match table {
            NotificationTable::Empty => self.line("[sap] no quality notifications"),
            NotificationTable::Rows(rows) => {
                self.line(&format!("[sap] {} notification(s)", rows.len()));
                for row in rows {
                    self.line(&format!(
                        "  {:<10} {:<7} P{} {:<6} {:<5} {}  {}",
                        row.id,
                        row.dtc_code,
                        row.priority_class,
                        row.status,
                        row.plant,
                        row.created,
                        row.description
                    ));
                }
            }
        }
    }
}

fn severity_mark(severity: Severity) -> &'static str {
    match severity {
        Severity::Normal => "",
        Severity::Warn => " (!)",
        Severity::Fault => " (!!)",
    }
}

impl<W: Write + Send> Renderer for ConsoleRenderer<W> {
    fn status(&mut self, state: &ConnectionState) {
        match state {
            ConnectionState::Reconnecting { attempt, delay } => self.line(&format!(
                "[ws] {} (attempt {attempt}, in {:.1}s)",
                state.label(),
                delay.as_secs_f64()
            )),
            _ => self.line(&format!("[ws] {}", state.label())),
        }
    }

    fn snapshot(&mut self, view: &TelemetryReconciler, report: &ReconcileReport) {
        for line in &report.can_lines {
            self.log_line("[can]", line);
        }
        for line in &report.event_lines {
            self.log_line("[evt]", line);
        }
        if report.lock_changed {
            self.line(&format!("[lock] {}", view.lock.view()));
        }
        if report.notifications_changed {
            self.table(&view.table);
        }
    }

    fn notifications(&mut self, table: &NotificationTable) {
        self.table(table);
    }

    fn feedback(&mut self, feedback: &Feedback) {
        let marker = match feedback.kind {
            FeedbackKind::Pending => "..",
            FeedbackKind::Success => "ok",
            FeedbackKind::Error => "!!",
        };
        self.line(&format!("[{marker}] {}", feedback.text));
    }

    fn summary(&mut self, state: &ConnectionState, view: &TelemetryReconciler) {
        self.line(&format!("== {} ==", state.label()));
        if let Some(s) = &view.stats {
            self.line(&format!("uptime   {}   can {}", s.uptime, s.rate));
        }
        if let Some(v) = &view.vehicle {
            self.line(&format!(
                "vehicle  {}  faults {}  torque {}  speed {}",
                v.state_name, v.fault_mask, v.torque_limit, v.speed_limit
            ));
        }
        if let Some(m) = &view.motor {
            self.line(&format!(
                "motor    {} rpm  {} mA  {}°C{}  {}°C  duty {}%  faults {}{}",
                m.rpm,
                m.current_ma,
                m.temp_c,
                severity_mark(m.temp_severity),
                m.temp2_c,
                m.duty_pct,
                m.faults,
                severity_mark(m.fault_severity)
            ));
        }
        if let Some(s) = &view.steering {
            self.line(&format!(
                "steering {}° (cmd {}°)  {} mA  {}",
                s.actual_deg,
                s.commanded_deg,
                s.servo_ma,
                s.status.label()
            ));
        }
        if let Some(b) = &view.brake {
            self.line(&format!(
                "brake    {}% (cmd {}%)  {} mA  {}",
                b.position_pct,
                b.commanded_pct,
                b.servo_ma,
                b.status.label()
            ));
        }
        if let Some(b) = &view.battery {
            self.line(&format!(
                "battery  {} V  {}%{}  {}",
                b.voltage,
                b.soc_pct,
                if b.low { " (low)" } else { "" },
                b.status
            ));
        }
        if let Some(l) = &view.lidar {
            self.line(&format!(
                "lidar    {} cm  zone {}  signal {}",
                l.distance_cm, l.zone, l.signal_strength
            ));
        }
        if let Some(h) = &view.heartbeats {
            let channels: Vec<String> = h
                .channels()
                .iter()
                .map(|(name, alive)| format!("{name}:{}", if *alive { "up" } else { "DOWN" }))
                .collect();
            self.line(&format!("hb       {}", channels.join("  ")));
        }
        if let Some(a) = &view.anomaly {
            self.line(&format!(
                "anomaly  {}  {}  [{:>3.0}%]",
                a.score,
                if a.alert { "ALERT" } else { "OK" },
                a.bar_pct
            ));
        }
        self.line(&format!("lock     {}", view.lock.view()));
        self.table(&view.table);
    }
}
