//! SQLite storage layer -- pool, schema, and the event store contract.

pub mod schema;
pub mod sqlite;
pub mod stats;

pub use self::sqlite::SqliteStore;

use crate::config::StorageConfig;
use crate::detect::incident::{NewIncident, StatusChange};
use crate::detect::RuleId;
use crate::events::{EventKind, Outcome, SecurityEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Store handle shared by every component of a monitoring process.
pub type SharedStore = Arc<dyn EventStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached at all. Fatal at process start.
    #[error("store unreachable: {0}")]
    Connection(String),
    #[error("query failed ({op}): {message}")]
    Query { op: &'static str, message: String },
    #[error("write failed ({op}): {message}")]
    Write { op: &'static str, message: String },
}

impl StoreError {
    pub fn query(op: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Query { op, message: err.to_string() }
    }

    pub fn write(op: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Write { op, message: err.to_string() }
    }
}

/// The surface of the event store that detection and alerting rely on.
pub trait EventStore: Send + Sync {
    /// Events of `kind` with `outcome` whose timestamp lies in `[since, until]`,
    /// ordered by source address, then timestamp descending, then id descending.
    fn query_events(
        &self,
        kind: EventKind,
        outcome: Outcome,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SecurityEvent>, StoreError>;

    /// Insert one incident atomically and return its id.
    fn insert_incident(&self, incident: &NewIncident) -> Result<i64, StoreError>;

    /// Number of incidents recorded for `(event_id, rule_id)`.
    fn count_incidents(&self, event_id: i64, rule_id: RuleId) -> Result<u64, StoreError>;

    /// Apply a status change. `Ok(false)` when no incident has that id.
    fn update_incident_status(
        &self,
        incident_id: i64,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Registered name of a server, if any.
    fn server_name(&self, server_id: i64) -> Result<Option<String>, StoreError>;
}

/// Server name with the `"Server {id}"` fallback for unknown ids and lookup failures.
pub fn lookup_server_name(store: &dyn EventStore, server_id: i64) -> String {
    match store.server_name(server_id) {
        Ok(Some(name)) => name,
        Ok(None) => format!("Server {}", server_id),
        Err(e) => {
            tracing::warn!(server_id, error = %e, "Server name lookup failed");
            format!("Server {}", server_id)
        }
    }
}

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(config: &StorageConfig) -> Result<Pool, StoreError> {
    let path = Path::new(&config.path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Connection(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::builder()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build(manager)
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    // Run migrations on a single connection
    let conn = pool.get().map_err(|e| StoreError::Connection(e.to_string()))?;
    schema::migrate(&conn, config.unique_incidents)
        .map_err(|e| StoreError::Connection(format!("migration failed: {}", e)))?;

    Ok(pool)
}

/// Fixed-width UTC text form used for every timestamp column, so that
/// lexical comparison in SQL matches chronological order.
pub fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn from_db_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_time_is_fixed_width_and_ordered() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        assert_eq!(to_db_time(a), "2026-01-02T03:04:05.000Z");
        assert!(to_db_time(a) < to_db_time(b));
        assert_eq!(from_db_time(&to_db_time(b)).unwrap(), b);
    }

    #[test]
    fn test_open_pool_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            path: dir.path().join("nested/cloudsec.db").display().to_string(),
            ..StorageConfig::default()
        };
        let pool = open_pool(&config).unwrap();
        let conn = pool.get().unwrap();
        let servers: i64 = conn
            .query_row("SELECT COUNT(*) FROM servers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(servers, 3);
    }
}
