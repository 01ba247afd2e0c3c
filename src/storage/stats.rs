//! Read-only aggregates over events and incidents, for the CLI and the dashboard feed.

use crate::storage::{Pool, StoreError};
use rusqlite::params;
use serde::Serialize;

/// Headline numbers shown at the top of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub total_events: i64,
    /// CRITICAL incidents still in NEW status.
    pub open_critical_incidents: i64,
    /// Distinct source addresses with at least one FAILURE event.
    pub failing_sources: i64,
    pub total_incidents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityStatusCount {
    pub severity: String,
    pub status: String,
    pub count: i64,
}

fn count(pool: &Pool, op: &'static str, sql: &str) -> Result<i64, StoreError> {
    let conn = pool.get().map_err(|e| StoreError::query(op, e))?;
    conn.query_row(sql, [], |row| row.get(0))
        .map_err(|e| StoreError::query(op, e))
}

fn label_counts(pool: &Pool, op: &'static str, sql: &str, limit: i64) -> Result<Vec<LabelCount>, StoreError> {
    let conn = pool.get().map_err(|e| StoreError::query(op, e))?;
    let mut stmt = conn.prepare(sql).map_err(|e| StoreError::query(op, e))?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(LabelCount { label: row.get(0)?, count: row.get(1)? })
        })
        .map_err(|e| StoreError::query(op, e))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::query(op, e))
}

pub fn global_stats(pool: &Pool) -> Result<GlobalStats, StoreError> {
    Ok(GlobalStats {
        total_events: count(pool, "count events", "SELECT COUNT(*) FROM security_events")?,
        open_critical_incidents: count(
            pool,
            "count open critical incidents",
            "SELECT COUNT(*) FROM incidents WHERE severity = 'CRITICAL' AND status = 'NEW'",
        )?,
        failing_sources: count(
            pool,
            "count failing sources",
            "SELECT COUNT(DISTINCT source_addr) FROM security_events WHERE outcome = 'FAILURE'",
        )?,
        total_incidents: count(pool, "count incidents", "SELECT COUNT(*) FROM incidents")?,
    })
}

pub fn events_by_type(pool: &Pool) -> Result<Vec<LabelCount>, StoreError> {
    label_counts(
        pool,
        "events by type",
        "SELECT event_type, COUNT(*) AS n FROM security_events
         GROUP BY event_type ORDER BY n DESC, event_type LIMIT ?1",
        i64::MAX,
    )
}

/// Incident counts per detection day (UTC), newest day first.
pub fn incidents_by_day(pool: &Pool, days: i64) -> Result<Vec<LabelCount>, StoreError> {
    label_counts(
        pool,
        "incidents by day",
        "SELECT substr(detected_at, 1, 10) AS day, COUNT(*) FROM incidents
         GROUP BY day ORDER BY day DESC LIMIT ?1",
        days,
    )
}

/// Source addresses with the most FAILURE events.
pub fn top_failing_sources(pool: &Pool, limit: i64) -> Result<Vec<LabelCount>, StoreError> {
    label_counts(
        pool,
        "top failing sources",
        "SELECT source_addr, COUNT(*) AS n FROM security_events WHERE outcome = 'FAILURE'
         GROUP BY source_addr ORDER BY n DESC, source_addr LIMIT ?1",
        limit,
    )
}

/// Events per server name.
pub fn events_by_server(pool: &Pool) -> Result<Vec<LabelCount>, StoreError> {
    label_counts(
        pool,
        "events by server",
        "SELECT COALESCE(s.name, 'Server ' || e.server_id) AS server, COUNT(*) AS n
         FROM security_events e LEFT JOIN servers s ON e.server_id = s.id
         GROUP BY server ORDER BY n DESC, server LIMIT ?1",
        i64::MAX,
    )
}

/// Incident counts grouped by severity then status, CRITICAL and NEW first.
pub fn incident_breakdown(pool: &Pool) -> Result<Vec<SeverityStatusCount>, StoreError> {
    const OP: &str = "incident breakdown";
    let conn = pool.get().map_err(|e| StoreError::query(OP, e))?;
    let mut stmt = conn
        .prepare(
            "SELECT severity, status, COUNT(*) FROM incidents
             GROUP BY severity, status
             ORDER BY CASE severity WHEN 'CRITICAL' THEN 0 WHEN 'MEDIUM' THEN 1 ELSE 2 END,
                      CASE status WHEN 'NEW' THEN 0 WHEN 'IN_PROGRESS' THEN 1 ELSE 2 END",
        )
        .map_err(|e| StoreError::query(OP, e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SeverityStatusCount {
                severity: row.get(0)?,
                status: row.get(1)?,
                count: row.get(2)?,
            })
        })
        .map_err(|e| StoreError::query(OP, e))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::query(OP, e))
}
