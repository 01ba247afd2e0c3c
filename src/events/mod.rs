//! Security event records as produced by the log collector.

pub mod generator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Category of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Ssh,
    PortScan,
    FileAccess,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Ssh => "SSH",
            EventKind::PortScan => "PORT_SCAN",
            EventKind::FileAccess => "FILE_ACCESS",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SSH" => Ok(EventKind::Ssh),
            "PORT_SCAN" => Ok(EventKind::PortScan),
            "FILE_ACCESS" => Ok(EventKind::FileAccess),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// Result recorded for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
    Detected,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
            Outcome::Detected => "DETECTED",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Outcome::Success),
            "FAILURE" => Ok(Outcome::Failure),
            "DETECTED" => Ok(Outcome::Detected),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// A stored security event. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityEvent {
    pub id: i64,
    pub server_id: i64,
    pub kind: EventKind,
    /// Not validated as an IP address.
    pub source_addr: String,
    pub user: Option<String>,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// An event about to be written. `timestamp: None` lets the store assign
/// the creation time.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub server_id: i64,
    pub kind: EventKind,
    pub source_addr: String,
    pub user: Option<String>,
    pub outcome: Outcome,
    pub description: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEvent {
    pub fn new(server_id: i64, kind: EventKind, source_addr: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            server_id,
            kind,
            source_addr: source_addr.into(),
            user: None,
            outcome,
            description: String::new(),
            timestamp: None,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_db_label() {
        for kind in [EventKind::Ssh, EventKind::PortScan, EventKind::FileAccess] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("scan_port".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_new_event_builder() {
        let e = NewEvent::new(1, EventKind::Ssh, "10.0.0.50", Outcome::Failure).user("root");
        assert_eq!(e.user.as_deref(), Some("root"));
        assert!(e.timestamp.is_none());
        assert!(e.description.is_empty());
    }
}
