//! SQL DDL for all prefsync tables.
//!
//! Defines `session_preferences` (the authoritative record per session),
//! `session_agents` (session → agent bindings), `preference_log` (audit trail),
//! and `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Authoritative preference record, one row per conversation
CREATE TABLE IF NOT EXISTS session_preferences (
    session_id TEXT PRIMARY KEY CHECK(length(session_id) > 0),
    payload TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Session -> agent bindings
CREATE TABLE IF NOT EXISTS session_agents (
    session_id TEXT PRIMARY KEY CHECK(length(session_id) > 0),
    agent_name TEXT NOT NULL,
    bound_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_agents_agent ON session_agents(agent_name);

-- Audit log
CREATE TABLE IF NOT EXISTS preference_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('write','bind','unbind','delete','normalize')),
    session_id TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_preference_log_session ON preference_log(session_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"session_preferences".to_string()));
        assert!(tables.contains(&"session_agents".to_string()));
        assert!(tables.contains(&"preference_log".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO session_preferences (session_id, payload, created_at, updated_at) VALUES ('', '{}', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
