//! Alert presentation for newly created incidents.

use crate::detect::{IncidentStatus, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RULE_WIDTH: usize = 60;

/// A freshly recorded incident, as handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct Alert {
    pub incident_id: i64,
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}

/// Receives one call per successfully created incident.
pub trait AlertSink: Send + Sync {
    fn display_alert(&self, alert: &Alert);
}

/// Which sink the monitor reports alerts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSinkKind {
    /// Severity-colored banner on stdout.
    #[default]
    Console,
    /// A structured WARN log line.
    Log,
}

impl AlertSinkKind {
    pub fn build(self) -> Arc<dyn AlertSink> {
        match self {
            AlertSinkKind::Console => Arc::new(ConsoleAlertSink),
            AlertSinkKind::Log => Arc::new(TracingAlertSink),
        }
    }
}

pub struct ConsoleAlertSink;

impl AlertSink for ConsoleAlertSink {
    fn display_alert(&self, alert: &Alert) {
        println!("{}", render_banner(alert));
    }
}

/// Terminal banner for an alert, colored by severity.
pub fn render_banner(alert: &Alert) -> String {
    let style = alert.severity.style();
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "\n{}{}{}", style.color, BOLD, rule);
    let _ = writeln!(out, "{} [{}] INCIDENT #{}", style.marker, style.banner, alert.incident_id);
    let _ = writeln!(out, "{}{}", rule, RESET);
    let _ = writeln!(out, "{}Type: {}", style.color, alert.incident_type);
    let _ = writeln!(out, "Severity: {}", style.label);
    let _ = writeln!(out, "Description: {}", alert.description);
    let _ = writeln!(out, "Date: {}", alert.detected_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Status: {}{}", IncidentStatus::New, RESET);
    let _ = write!(out, "{}{}{}", style.color, rule, RESET);
    out
}

pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn display_alert(&self, alert: &Alert) {
        tracing::warn!(
            incident_id = alert.incident_id,
            severity = %alert.severity,
            incident_type = %alert.incident_type,
            "{}",
            alert.description
        );
    }
}
