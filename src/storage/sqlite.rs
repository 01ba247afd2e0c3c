//! SQLite-backed event store.

use crate::detect::incident::{NewIncident, StatusChange};
use crate::detect::{Incident, IncidentStatus, RuleId};
use crate::events::{EventKind, NewEvent, Outcome, SecurityEvent};
use crate::storage::{from_db_time, to_db_time, EventStore, Pool, StoreError};
use chrono::{DateTime, Utc};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use std::str::FromStr;

type Conn = PooledConnection<SqliteConnectionManager>;

/// Event store over an r2d2 SQLite pool. Cheap to clone.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

/// An incident joined with the event and server that triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentView {
    #[serde(flatten)]
    pub incident: Incident,
    pub server_name: String,
    pub source_addr: String,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    fn conn_for_query(&self, op: &'static str) -> Result<Conn, StoreError> {
        self.pool.get().map_err(|e| StoreError::query(op, e))
    }

    fn conn_for_write(&self, op: &'static str) -> Result<Conn, StoreError> {
        self.pool.get().map_err(|e| StoreError::write(op, e))
    }

    /// Write one security event; used by the event producer.
    pub fn insert_event(&self, event: &NewEvent) -> Result<i64, StoreError> {
        const OP: &str = "insert event";
        let conn = self.conn_for_write(OP)?;
        let timestamp = to_db_time(event.timestamp.unwrap_or_else(Utc::now));
        conn.execute(
            "INSERT INTO security_events (server_id, event_type, source_addr, username, outcome, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.server_id,
                event.kind.as_str(),
                event.source_addr,
                event.user,
                event.outcome.as_str(),
                event.description,
                timestamp
            ],
        )
        .map_err(|e| StoreError::write(OP, e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<SecurityEvent>, StoreError> {
        const OP: &str = "recent events";
        let conn = self.conn_for_query(OP)?;
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY created_at DESC, id DESC LIMIT ?1", EVENT_SELECT))
            .map_err(|e| StoreError::query(OP, e))?;
        let rows = stmt
            .query_map(params![limit as i64], event_from_row)
            .map_err(|e| StoreError::query(OP, e))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::query(OP, e))
    }

    pub fn get_incident(&self, incident_id: i64) -> Result<Option<Incident>, StoreError> {
        const OP: &str = "get incident";
        let conn = self.conn_for_query(OP)?;
        conn.query_row(
            &format!("{} WHERE i.id = ?1", INCIDENT_SELECT),
            params![incident_id],
            incident_from_row,
        )
        .optional()
        .map_err(|e| StoreError::query(OP, e))
    }

    /// Most recently detected incidents with server name and source address.
    pub fn recent_incidents(&self, limit: usize) -> Result<Vec<IncidentView>, StoreError> {
        const OP: &str = "recent incidents";
        let conn = self.conn_for_query(OP)?;
        let mut stmt = conn
            .prepare(&format!(
                "{} ORDER BY i.detected_at DESC, i.id DESC LIMIT ?1",
                INCIDENT_SELECT
            ))
            .map_err(|e| StoreError::query(OP, e))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(IncidentView {
                    incident: incident_from_row(row)?,
                    server_name: row.get(11)?,
                    source_addr: row.get(12)?,
                })
            })
            .map_err(|e| StoreError::query(OP, e))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::query(OP, e))
    }
}

const EVENT_SELECT: &str = "SELECT id, server_id, event_type, source_addr, username, outcome, created_at, description
     FROM security_events";

const INCIDENT_SELECT: &str = "SELECT i.id, i.event_id, i.rule_id, i.incident_type, i.description, i.severity, i.status,
            i.detected_at, i.resolved_at, i.resolved_by, i.notes,
            COALESCE(s.name, 'Server ' || e.server_id), e.source_addr
     FROM incidents i
     JOIN security_events e ON i.event_id = e.id
     LEFT JOIN servers s ON e.server_id = s.id";

fn parse_column<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    from_db_time(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<SecurityEvent> {
    Ok(SecurityEvent {
        id: row.get(0)?,
        server_id: row.get(1)?,
        kind: parse_column::<EventKind>(row, 2)?,
        source_addr: row.get(3)?,
        user: row.get(4)?,
        outcome: parse_column::<Outcome>(row, 5)?,
        timestamp: time_column(row, 6)?,
        description: row.get(7)?,
    })
}

fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<Incident> {
    let resolved_at = match row.get::<_, Option<String>>(8)? {
        Some(raw) => Some(
            from_db_time(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };

    Ok(Incident {
        id: row.get(0)?,
        event_id: row.get(1)?,
        rule_id: RuleId(row.get(2)?),
        incident_type: row.get(3)?,
        description: row.get(4)?,
        severity: parse_column(row, 5)?,
        status: parse_column(row, 6)?,
        detected_at: time_column(row, 7)?,
        resolved_at,
        resolved_by: row.get(9)?,
        notes: row.get(10)?,
    })
}

impl EventStore for SqliteStore {
    fn query_events(
        &self,
        kind: EventKind,
        outcome: Outcome,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        const OP: &str = "query events";
        let conn = self.conn_for_query(OP)?;
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE event_type = ?1 AND outcome = ?2 AND created_at >= ?3 AND created_at <= ?4
                 ORDER BY source_addr, created_at DESC, id DESC",
                EVENT_SELECT
            ))
            .map_err(|e| StoreError::query(OP, e))?;

        let rows = stmt
            .query_map(
                params![kind.as_str(), outcome.as_str(), to_db_time(since), to_db_time(until)],
                event_from_row,
            )
            .map_err(|e| StoreError::query(OP, e))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::query(OP, e))
    }

    fn insert_incident(&self, incident: &NewIncident) -> Result<i64, StoreError> {
        const OP: &str = "insert incident";
        let conn = self.conn_for_write(OP)?;
        conn.execute(
            "INSERT INTO incidents (event_id, rule_id, incident_type, description, severity, status, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                incident.event_id,
                incident.rule_id.0,
                incident.incident_type,
                incident.description,
                incident.severity.as_str(),
                incident.status().as_str(),
                to_db_time(incident.detected_at)
            ],
        )
        .map_err(|e| StoreError::write(OP, e))?;
        Ok(conn.last_insert_rowid())
    }

    fn count_incidents(&self, event_id: i64, rule_id: RuleId) -> Result<u64, StoreError> {
        const OP: &str = "count incidents";
        let conn = self.conn_for_query(OP)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM incidents WHERE event_id = ?1 AND rule_id = ?2",
                params![event_id, rule_id.0],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::query(OP, e))?;
        Ok(count.max(0) as u64)
    }

    fn update_incident_status(
        &self,
        incident_id: i64,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        const OP: &str = "update incident status";
        let conn = self.conn_for_write(OP)?;
        let changed = match change {
            StatusChange::Resolved { resolved_by, notes } => conn.execute(
                "UPDATE incidents
                 SET status = ?1, resolved_at = ?2, resolved_by = ?3, notes = ?4
                 WHERE id = ?5",
                params![
                    IncidentStatus::Resolved.as_str(),
                    to_db_time(at),
                    resolved_by,
                    notes,
                    incident_id
                ],
            ),
            other => conn.execute(
                "UPDATE incidents SET status = ?1 WHERE id = ?2",
                params![other.status().as_str(), incident_id],
            ),
        }
        .map_err(|e| StoreError::write(OP, e))?;
        Ok(changed > 0)
    }

    fn server_name(&self, server_id: i64) -> Result<Option<String>, StoreError> {
        const OP: &str = "server name";
        let conn = self.conn_for_query(OP)?;
        conn.query_row(
            "SELECT name FROM servers WHERE id = ?1",
            params![server_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::query(OP, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::detect::Severity;
    use crate::storage::{lookup_server_name, open_pool};
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            path: dir.path().join("test.db").display().to_string(),
            ..StorageConfig::default()
        };
        let store = SqliteStore::new(open_pool(&config).unwrap());
        (dir, store)
    }

    #[test]
    fn test_query_events_filters_and_orders() {
        let (_dir, store) = store();
        let now = Utc::now();
        let at = |secs: i64| now - Duration::seconds(secs);

        store.insert_event(&NewEvent::new(1, EventKind::Ssh, "b", Outcome::Failure).at(at(30))).unwrap();
        store.insert_event(&NewEvent::new(1, EventKind::Ssh, "a", Outcome::Failure).at(at(60))).unwrap();
        store.insert_event(&NewEvent::new(1, EventKind::Ssh, "a", Outcome::Failure).at(at(10))).unwrap();
        store.insert_event(&NewEvent::new(1, EventKind::Ssh, "a", Outcome::Success).at(at(10))).unwrap();
        store.insert_event(&NewEvent::new(1, EventKind::PortScan, "a", Outcome::Detected).at(at(10))).unwrap();
        store.insert_event(&NewEvent::new(1, EventKind::Ssh, "a", Outcome::Failure).at(at(900))).unwrap();

        let events = store
            .query_events(EventKind::Ssh, Outcome::Failure, now - Duration::minutes(5), now)
            .unwrap();
        let summary: Vec<(&str, i64)> = events
            .iter()
            .map(|e| (e.source_addr.as_str(), (now - e.timestamp).num_seconds()))
            .collect();
        assert_eq!(summary, vec![("a", 10), ("a", 60), ("b", 30)]);
    }

    #[test]
    fn test_incident_insert_count_and_resolve() {
        let (_dir, store) = store();
        let event_id = store
            .insert_event(&NewEvent::new(2, EventKind::PortScan, "198.23.45.67", Outcome::Detected))
            .unwrap();

        let id = store
            .insert_incident(&NewIncident {
                event_id,
                rule_id: RuleId(2),
                incident_type: "Port Scan Detection".into(),
                description: "scan".into(),
                severity: Severity::Medium,
                detected_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(store.count_incidents(event_id, RuleId(2)).unwrap(), 1);
        assert_eq!(store.count_incidents(event_id, RuleId(1)).unwrap(), 0);

        let resolve = StatusChange::Resolved { resolved_by: "Admin".into(), notes: "fixed".into() };
        assert!(store.update_incident_status(id, &resolve, Utc::now()).unwrap());
        assert!(!store.update_incident_status(id + 100, &resolve, Utc::now()).unwrap());

        let views = store.recent_incidents(10).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].server_name, "DBServer01");
        assert_eq!(views[0].source_addr, "198.23.45.67");
        assert_eq!(views[0].incident.status, IncidentStatus::Resolved);
    }

    #[test]
    fn test_incident_for_unknown_event_is_write_error() {
        let (_dir, store) = store();
        let err = store
            .insert_incident(&NewIncident {
                event_id: 999,
                rule_id: RuleId(1),
                incident_type: "Brute Force SSH".into(),
                description: "d".into(),
                severity: Severity::Critical,
                detected_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Write { op: "insert incident", .. }));
    }

    #[test]
    fn test_server_name_fallback() {
        let (_dir, store) = store();
        assert_eq!(lookup_server_name(&store, 1), "WebServer01");
        assert_eq!(lookup_server_name(&store, 77), "Server 77");
    }
}
