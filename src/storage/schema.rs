//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
///
/// With `unique_incidents`, a UNIQUE index on `(event_id, rule_id)` backs the
/// incident guard at the store level so that two monitors sharing one
/// database cannot both record the same incident.
pub fn migrate(conn: &Connection, unique_incidents: bool) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS servers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            ip_address TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS security_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id INTEGER NOT NULL REFERENCES servers(id),
            event_type TEXT NOT NULL CHECK (event_type IN ('SSH', 'PORT_SCAN', 'FILE_ACCESS')),
            source_addr TEXT NOT NULL,
            username TEXT,
            outcome TEXT NOT NULL CHECK (outcome IN ('SUCCESS', 'FAILURE', 'DETECTED')),
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS incidents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL REFERENCES security_events(id),
            rule_id INTEGER NOT NULL,
            incident_type TEXT NOT NULL,
            description TEXT NOT NULL,
            severity TEXT NOT NULL CHECK (severity IN ('LOW', 'MEDIUM', 'CRITICAL')),
            status TEXT NOT NULL DEFAULT 'NEW' CHECK (status IN ('NEW', 'IN_PROGRESS', 'RESOLVED')),
            detected_at TEXT NOT NULL,
            resolved_at TEXT,
            resolved_by TEXT,
            notes TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_events_window
            ON security_events(event_type, outcome, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_source ON security_events(source_addr);
        CREATE INDEX IF NOT EXISTS idx_incidents_event_rule ON incidents(event_id, rule_id);
        CREATE INDEX IF NOT EXISTS idx_incidents_detected ON incidents(detected_at);

        INSERT OR IGNORE INTO servers (id, name, ip_address, role) VALUES
            (1, 'WebServer01', '10.0.1.10', 'web'),
            (2, 'DBServer01', '10.0.1.20', 'database'),
            (3, 'AppServer01', '10.0.1.30', 'application');

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);",
    )?;

    if unique_incidents {
        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_incidents_event_rule ON incidents(event_id, rule_id);",
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, false).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM security_events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let name: String = conn
            .query_row("SELECT name FROM servers WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "WebServer01");
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, false).unwrap();
        migrate(&conn, true).unwrap();
        migrate(&conn, true).unwrap();
    }

    #[test]
    fn test_unique_index_rejects_second_incident() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, true).unwrap();
        conn.execute(
            "INSERT INTO security_events (server_id, event_type, source_addr, outcome) VALUES (1, 'SSH', 'x', 'FAILURE')",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO incidents (event_id, rule_id, incident_type, description, severity, detected_at)
                      VALUES (1, 1, 'Brute Force SSH', 'd', 'CRITICAL', '2026-01-01T00:00:00.000Z')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
