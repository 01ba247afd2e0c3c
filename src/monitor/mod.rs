//! One detection pass over every rule, and the loop that repeats it.

pub mod engine;

pub use self::engine::run_monitor_loop;

use crate::detect::alert::AlertSink;
use crate::detect::engine::{Candidate, DetectionEngine};
use crate::detect::guard::IncidentGuard;
use crate::detect::incident::IncidentRecorder;
use crate::detect::rules::{Rule, RuleKind};
use crate::storage::{lookup_server_name, SharedStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Whether the monitoring loop is currently running cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Idle,
    Cycling,
}

/// What happened to one candidate.
#[derive(Debug)]
pub enum RecordOutcome {
    Created(i64),
    /// An incident already exists for this event and rule.
    Suppressed,
    /// The write failed; the candidate will be re-evaluated next cycle.
    Failed(StoreError),
}

/// Per-rule tally of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule: RuleKind,
    pub candidates: usize,
    pub created: Vec<i64>,
    pub suppressed: usize,
    pub failed: usize,
    /// Set when the detection query itself failed.
    pub error: Option<String>,
}

impl RuleReport {
    fn new(rule: RuleKind) -> Self {
        Self {
            rule,
            candidates: 0,
            created: Vec::new(),
            suppressed: 0,
            failed: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub rules: Vec<RuleReport>,
}

impl CycleReport {
    pub fn incidents_created(&self) -> usize {
        self.rules.iter().map(|r| r.created.len()).sum()
    }

    pub fn candidates(&self) -> usize {
        self.rules.iter().map(|r| r.candidates).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.rules.iter().any(|r| r.error.is_some() || r.failed > 0)
    }

    pub fn rule(&self, kind: RuleKind) -> Option<&RuleReport> {
        self.rules.iter().find(|r| r.rule == kind)
    }
}

/// Detection engine, duplicate guard, and recorder wired to one store.
pub struct Monitor {
    store: SharedStore,
    engine: DetectionEngine,
    guard: IncidentGuard,
    recorder: IncidentRecorder,
    rules: Vec<Rule>,
    state: watch::Sender<MonitorState>,
}

impl Monitor {
    pub fn new(store: SharedStore, sink: Arc<dyn AlertSink>, rules: Vec<Rule>) -> Self {
        let (state, _) = watch::channel(MonitorState::Idle);
        Self {
            engine: DetectionEngine::new(store.clone()),
            guard: IncidentGuard::new(store.clone()),
            recorder: IncidentRecorder::new(store.clone(), sink),
            store,
            rules,
            state,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn recorder(&self) -> &IncidentRecorder {
        &self.recorder
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: MonitorState) {
        self.state.send_replace(state);
    }

    pub fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now())
    }

    /// Evaluate every rule against the window ending at `now`, recording
    /// each new candidate. Failures stay local to their rule or candidate.
    pub fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);
        let _enter = span.enter();

        let rules = self.rules.iter().map(|rule| self.evaluate(rule, now)).collect();
        let report = CycleReport { cycle_id, started_at: now, rules };
        info!(
            candidates = report.candidates(),
            created = report.incidents_created(),
            "Analysis complete"
        );
        report
    }

    fn evaluate(&self, rule: &Rule, now: DateTime<Utc>) -> RuleReport {
        let mut report = RuleReport::new(rule.kind);

        let candidates = match self.engine.detect_at(rule, now) {
            Ok(c) => c,
            Err(e) => {
                error!(rule = %rule.kind, error = %e, "Detection failed");
                report.error = Some(e.to_string());
                return report;
            }
        };

        if candidates.is_empty() {
            info!(rule = %rule.kind, "No attack detected");
        }
        report.candidates = candidates.len();

        for candidate in &candidates {
            match self.record(rule, candidate) {
                RecordOutcome::Created(id) => report.created.push(id),
                RecordOutcome::Suppressed => report.suppressed += 1,
                RecordOutcome::Failed(_) => report.failed += 1,
            }
        }
        report
    }

    /// Guard then record a single candidate of `rule`.
    pub fn record(&self, rule: &Rule, candidate: &Candidate) -> RecordOutcome {
        let server = lookup_server_name(self.store.as_ref(), candidate.server_id);
        let users: Vec<&str> = candidate.users.iter().map(String::as_str).collect();
        warn!(
            rule = %rule.kind,
            source = %candidate.source_addr,
            %server,
            count = candidate.count,
            users = %users.join(", "),
            first_seen = %candidate.first_seen,
            last_seen = %candidate.last_seen,
            "Attack detected"
        );

        let event_id = candidate.latest_event_id;
        if self.guard.exists(event_id, rule.id()) {
            info!(rule = %rule.kind, event_id, "Incident already recorded");
            return RecordOutcome::Suppressed;
        }

        match self.recorder.create(
            event_id,
            rule.id(),
            rule.kind.label(),
            &rule.describe(candidate),
            rule.severity,
        ) {
            Ok(id) => RecordOutcome::Created(id),
            Err(e) => {
                error!(rule = %rule.kind, event_id, error = %e, "Failed to record incident");
                RecordOutcome::Failed(e)
            }
        }
    }
}
