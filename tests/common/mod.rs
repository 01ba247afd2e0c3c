//! Shared fixtures: an on-disk store, a collecting alert sink, and a store
//! wrapper that fails on demand.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use cloudsecmonitor::config::StorageConfig;
use cloudsecmonitor::detect::alert::{Alert, AlertSink};
use cloudsecmonitor::detect::incident::{NewIncident, StatusChange};
use cloudsecmonitor::detect::rules::Rule;
use cloudsecmonitor::detect::RuleId;
use cloudsecmonitor::events::{EventKind, NewEvent, Outcome, SecurityEvent};
use cloudsecmonitor::monitor::Monitor;
use cloudsecmonitor::storage::{open_pool, EventStore, SharedStore, SqliteStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
pub struct CollectingSink {
    pub alerts: Mutex<Vec<Alert>>,
}

impl CollectingSink {
    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

impl AlertSink for CollectingSink {
    fn display_alert(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

/// Delegates to SQLite unless told to fail a given operation.
pub struct FlakyStore {
    pub inner: SqliteStore,
    pub fail_ssh_queries: AtomicBool,
    pub fail_all_queries: AtomicBool,
    pub fail_counts: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_ssh_queries: AtomicBool::new(false),
            fail_all_queries: AtomicBool::new(false),
            fail_counts: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }
}

impl EventStore for FlakyStore {
    fn query_events(
        &self,
        kind: EventKind,
        outcome: Outcome,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        if self.fail_all_queries.load(Ordering::SeqCst)
            || (kind == EventKind::Ssh && self.fail_ssh_queries.load(Ordering::SeqCst))
        {
            return Err(StoreError::query("query events", "injected failure"));
        }
        self.inner.query_events(kind, outcome, since, until)
    }

    fn insert_incident(&self, incident: &NewIncident) -> Result<i64, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::write("insert incident", "injected failure"));
        }
        self.inner.insert_incident(incident)
    }

    fn count_incidents(&self, event_id: i64, rule_id: RuleId) -> Result<u64, StoreError> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(StoreError::query("count incidents", "injected failure"));
        }
        self.inner.count_incidents(event_id, rule_id)
    }

    fn update_incident_status(
        &self,
        incident_id: i64,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::write("update incident status", "injected failure"));
        }
        self.inner.update_incident_status(incident_id, change, at)
    }

    fn server_name(&self, server_id: i64) -> Result<Option<String>, StoreError> {
        self.inner.server_name(server_id)
    }
}

pub struct Harness {
    _dir: TempDir,
    pub sqlite: SqliteStore,
    pub flaky: Arc<FlakyStore>,
    pub alerts: Arc<CollectingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(|_| {})
    }

    pub fn with_storage(tweak: impl FnOnce(&mut StorageConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig {
            path: dir.path().join("cloudsec.db").display().to_string(),
            ..StorageConfig::default()
        };
        tweak(&mut config);
        let sqlite = SqliteStore::new(open_pool(&config).unwrap());
        let flaky = Arc::new(FlakyStore::new(sqlite.clone()));
        Self {
            _dir: dir,
            sqlite,
            flaky,
            alerts: Arc::new(CollectingSink::default()),
        }
    }

    pub fn shared(&self) -> SharedStore {
        self.flaky.clone()
    }

    pub fn monitor(&self) -> Monitor {
        Monitor::new(self.shared(), self.alerts.clone(), Rule::defaults())
    }

    /// Insert one event `secs_ago` seconds before `now`.
    pub fn event(&self, kind: EventKind, outcome: Outcome, addr: &str, now: DateTime<Utc>, secs_ago: i64) -> i64 {
        let user = if kind == EventKind::Ssh { Some("root") } else { None };
        let mut event = NewEvent::new(1, kind, addr, outcome).at(now - Duration::seconds(secs_ago));
        if let Some(user) = user {
            event = event.user(user);
        }
        self.sqlite.insert_event(&event).unwrap()
    }

    pub fn ssh_failures(&self, addr: &str, now: DateTime<Utc>, offsets: &[i64]) -> Vec<i64> {
        offsets
            .iter()
            .map(|&s| self.event(EventKind::Ssh, Outcome::Failure, addr, now, s))
            .collect()
    }

    pub fn port_scans(&self, addr: &str, now: DateTime<Utc>, offsets: &[i64]) -> Vec<i64> {
        offsets
            .iter()
            .map(|&s| self.event(EventKind::PortScan, Outcome::Detected, addr, now, s))
            .collect()
    }

    pub fn incident_count(&self) -> i64 {
        let conn = self.sqlite.pool().get().unwrap();
        conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
            .unwrap()
    }
}

/// Six attempts spread over now-4m .. now-1m.
pub const SCENARIO_A_OFFSETS: [i64; 6] = [240, 204, 168, 132, 96, 60];
