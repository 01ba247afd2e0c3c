//! Attack detection, incident deduplication, and incident recording.

pub mod alert;
pub mod engine;
pub mod guard;
pub mod incident;
pub mod rules;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of a detection rule as stored on incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub i64);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity levels for detected incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low = 0,
    Medium = 1,
    Critical = 2,
}

/// How a severity is presented to an operator.
#[derive(Debug)]
pub struct SeverityStyle {
    pub label: &'static str,
    pub banner: &'static str,
    pub marker: &'static str,
    /// ANSI SGR color sequence.
    pub color: &'static str,
}

// Indexed by `Severity as usize`.
const SEVERITY_STYLES: [SeverityStyle; 3] = [
    SeverityStyle { label: "LOW", banner: "LOW ALERT", marker: "🟢", color: "\x1b[92m" },
    SeverityStyle { label: "MEDIUM", banner: "MEDIUM ALERT", marker: "🟠", color: "\x1b[93m" },
    SeverityStyle { label: "CRITICAL", banner: "CRITICAL ALERT", marker: "🔴", color: "\x1b[91m" },
];

impl Severity {
    pub fn style(self) -> &'static SeverityStyle {
        &SEVERITY_STYLES[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.style().label
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity '{}'", s)),
        }
    }
}

/// Lifecycle of an incident: NEW at creation, then IN_PROGRESS or RESOLVED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    New,
    InProgress,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::New => "NEW",
            IncidentStatus::InProgress => "IN_PROGRESS",
            IncidentStatus::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "NEW" => Ok(IncidentStatus::New),
            "IN_PROGRESS" => Ok(IncidentStatus::InProgress),
            "RESOLVED" => Ok(IncidentStatus::Resolved),
            _ => Err(format!("unknown incident status '{}'", s)),
        }
    }
}

/// A recorded incident.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: i64,
    pub event_id: i64,
    pub rule_id: RuleId,
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_lookup() {
        assert_eq!(Severity::Critical.style().label, "CRITICAL");
        assert_eq!(Severity::Medium.style().banner, "MEDIUM ALERT");
        assert_eq!("low".parse::<Severity>().unwrap(), Severity::Low);
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("critique".parse::<Severity>().is_err());
        assert!(Severity::Critical > Severity::Medium);
    }

    #[test]
    fn test_status_parse_accepts_cli_spelling() {
        assert_eq!("in-progress".parse::<IncidentStatus>().unwrap(), IncidentStatus::InProgress);
        assert_eq!("RESOLVED".parse::<IncidentStatus>().unwrap(), IncidentStatus::Resolved);
        assert!("closed".parse::<IncidentStatus>().is_err());
    }
}
