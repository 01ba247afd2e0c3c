//! Detection rules: which events count, over what window, and how many are enough.

use crate::config::RuleSettings;
use crate::detect::engine::Candidate;
use crate::detect::{RuleId, Severity};
use crate::events::{EventKind, Outcome};
use chrono::Duration;
use serde::Serialize;

/// The fixed set of rules the monitor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    BruteForceSsh,
    PortScan,
}

impl RuleKind {
    pub const ALL: [RuleKind; 2] = [RuleKind::BruteForceSsh, RuleKind::PortScan];

    pub fn id(self) -> RuleId {
        match self {
            RuleKind::BruteForceSsh => RuleId(1),
            RuleKind::PortScan => RuleId(2),
        }
    }

    pub fn event_kind(self) -> EventKind {
        match self {
            RuleKind::BruteForceSsh => EventKind::Ssh,
            RuleKind::PortScan => EventKind::PortScan,
        }
    }

    pub fn outcome(self) -> Outcome {
        match self {
            RuleKind::BruteForceSsh => Outcome::Failure,
            RuleKind::PortScan => Outcome::Detected,
        }
    }

    /// Incident type label written on incidents raised by this rule.
    pub fn label(self) -> &'static str {
        match self {
            RuleKind::BruteForceSsh => "Brute Force SSH",
            RuleKind::PortScan => "Port Scan Detection",
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::BruteForceSsh => write!(f, "brute_force_ssh"),
            RuleKind::PortScan => write!(f, "port_scan"),
        }
    }
}

/// A rule with its window, inclusive threshold, and severity.
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    pub window: Duration,
    pub threshold: u32,
    pub severity: Severity,
}

impl Rule {
    /// 5+ failed SSH logins within 5 minutes from one source.
    pub fn brute_force_ssh() -> Self {
        Self {
            kind: RuleKind::BruteForceSsh,
            window: Duration::minutes(5),
            threshold: 5,
            severity: Severity::Critical,
        }
    }

    /// 3+ detected port scans within 10 minutes from one source.
    pub fn port_scan() -> Self {
        Self {
            kind: RuleKind::PortScan,
            window: Duration::minutes(10),
            threshold: 3,
            severity: Severity::Medium,
        }
    }

    pub fn defaults() -> Vec<Rule> {
        RuleKind::ALL.into_iter().map(Self::builtin).collect()
    }

    pub fn builtin(kind: RuleKind) -> Self {
        match kind {
            RuleKind::BruteForceSsh => Self::brute_force_ssh(),
            RuleKind::PortScan => Self::port_scan(),
        }
    }

    pub fn from_settings(kind: RuleKind, settings: &RuleSettings) -> Self {
        Self {
            kind,
            window: Duration::seconds(settings.window_secs.min(i32::MAX as u64) as i64),
            threshold: settings.threshold,
            severity: settings.severity,
        }
    }

    pub fn id(&self) -> RuleId {
        self.kind.id()
    }

    /// Threshold is inclusive.
    pub fn is_triggered(&self, count: usize) -> bool {
        count >= self.threshold as usize
    }

    /// Human-readable incident description for a candidate of this rule.
    pub fn describe(&self, candidate: &Candidate) -> String {
        match self.kind {
            RuleKind::BruteForceSsh => format!(
                "SSH brute force detected - {} attempts from {}",
                candidate.count, candidate.source_addr
            ),
            RuleKind::PortScan => format!(
                "Massive port scan detected - {} scans from {}",
                candidate.count, candidate.source_addr
            ),
        }
    }
}
