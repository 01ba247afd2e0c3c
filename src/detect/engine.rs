use crate::detect::rules::{Rule, RuleKind};
use crate::events::SecurityEvent;
use crate::storage::{SharedStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A detected but not yet recorded attack: one source address whose
/// matching events reached a rule's threshold inside the window.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub rule: RuleKind,
    pub source_addr: String,
    pub count: usize,
    /// Server targeted by the most recent matching event.
    pub server_id: i64,
    pub latest_event_id: i64,
    pub earliest_event_id: i64,
    /// Distinct user names tried (empty for rules without users).
    pub users: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Candidate {
    pub fn span(&self) -> Duration {
        self.last_seen - self.first_seen
    }
}

/// Sliding-window detector. Owns no state besides the store handle.
pub struct DetectionEngine {
    store: SharedStore,
}

impl DetectionEngine {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Evaluate `rule` over the window ending now.
    pub fn detect(&self, rule: &Rule) -> Result<Vec<Candidate>, StoreError> {
        self.detect_at(rule, Utc::now())
    }

    /// Evaluate `rule` over `[now - window, now]`.
    pub fn detect_at(&self, rule: &Rule, now: DateTime<Utc>) -> Result<Vec<Candidate>, StoreError> {
        let since = now - rule.window;
        let events = self
            .store
            .query_events(rule.kind.event_kind(), rule.kind.outcome(), since, now)?;
        debug!(rule = %rule.kind, matched = events.len(), %since, "Window scanned");

        Ok(group_candidates(rule, events))
    }
}

/// Partition events by source address and summarize every group that
/// reaches the rule's threshold. Output is ordered by source address.
pub fn group_candidates(rule: &Rule, events: Vec<SecurityEvent>) -> Vec<Candidate> {
    let mut by_source: BTreeMap<String, Vec<SecurityEvent>> = BTreeMap::new();
    for event in events {
        by_source.entry(event.source_addr.clone()).or_default().push(event);
    }

    let mut candidates = Vec::new();
    for (source_addr, mut group) in by_source {
        if !rule.is_triggered(group.len()) {
            continue;
        }

        // Newest first; ids break timestamp ties.
        group.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        let (Some(latest), Some(earliest)) = (group.first(), group.last()) else {
            continue;
        };

        let users = group.iter().filter_map(|e| e.user.clone()).collect();

        candidates.push(Candidate {
            rule: rule.kind,
            count: group.len(),
            server_id: latest.server_id,
            latest_event_id: latest.id,
            earliest_event_id: earliest.id,
            users,
            first_seen: earliest.timestamp,
            last_seen: latest.timestamp,
            source_addr,
        });
    }
    candidates
}
