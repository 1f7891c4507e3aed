//! SQLite-backed server store and binding store.
//!
//! The connection sits behind `Arc<Mutex<_>>`; async trait methods hop onto
//! `spawn_blocking` for the actual SQL. Every write records an audit row in
//! `preference_log` inside the same transaction.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{PreferenceServer, StoreError};
use crate::db;
use crate::prefs::binding::AgentBindingStore;
use crate::prefs::merge::normalize_record;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Open (or create) the database file and wrap it.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(db::open_database(path)?))
    }

    /// Run `f` against the connection on the current thread.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".into()))?;
        f(&mut *conn)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl PreferenceServer for SqliteStore {
    async fn fetch_preferences(&self, session_id: &str) -> Result<Option<Value>, StoreError> {
        let session_id = session_id.to_string();
        self.run(move |conn| read_preferences(conn, &session_id))
            .await
    }

    async fn persist_preferences(
        &self,
        session_id: &str,
        preferences: &Value,
    ) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        let preferences = preferences.clone();
        let revision = self
            .run(move |conn| write_preferences(conn, &session_id, &preferences))
            .await?;
        tracing::debug!(revision, "preferences persisted");
        Ok(())
    }

    async fn delete_preferences(&self, session_id: &str) -> Result<bool, StoreError> {
        let session_id = session_id.to_string();
        self.run(move |conn| delete_preferences(conn, &session_id))
            .await
    }
}

impl AgentBindingStore for SqliteStore {
    fn bound_agent(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT agent_name FROM session_agents WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn bind_agent(&mut self, session_id: &str, agent: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let now = chrono::Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO session_agents (session_id, agent_name, bound_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(session_id) DO UPDATE SET agent_name = excluded.agent_name, bound_at = excluded.bound_at",
                params![session_id, agent, now],
            )?;
            write_audit_log(&tx, "bind", session_id, Some(&serde_json::json!({ "agent": agent })))?;
            tx.commit()?;
            Ok(())
        })
    }

    fn unbind_agent(&mut self, session_id: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM session_agents WHERE session_id = ?1",
                params![session_id],
            )?;
            if removed > 0 {
                write_audit_log(&tx, "unbind", session_id, None)?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
    }
}

/// Read the stored payload for a session.
pub fn read_preferences(conn: &Connection, session_id: &str) -> Result<Option<Value>, StoreError> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM session_preferences WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    match payload {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Replace the stored record. The payload is normalized first, so legacy
/// encodings and unknown fields never reach disk. Returns the new revision.
pub fn write_preferences(
    conn: &mut Connection,
    session_id: &str,
    preferences: &Value,
) -> Result<i64, StoreError> {
    if session_id.is_empty() {
        return Err(StoreError::Unavailable("empty session id".into()));
    }
    let normalized = serde_json::to_string(&normalize_record(preferences))?;
    let now = chrono::Utc::now().to_rfc3339();

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO session_preferences (session_id, payload, revision, created_at, updated_at) \
         VALUES (?1, ?2, 1, ?3, ?3) \
         ON CONFLICT(session_id) DO UPDATE SET payload = excluded.payload, \
         revision = session_preferences.revision + 1, updated_at = excluded.updated_at",
        params![session_id, normalized, now],
    )?;
    let revision: i64 = tx.query_row(
        "SELECT revision FROM session_preferences WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    write_audit_log(
        &tx,
        "write",
        session_id,
        Some(&serde_json::json!({ "revision": revision })),
    )?;
    tx.commit()?;

    Ok(revision)
}

/// Delete the stored record. Returns `true` if one existed.
pub fn delete_preferences(conn: &mut Connection, session_id: &str) -> Result<bool, StoreError> {
    let tx = conn.transaction()?;
    let removed = tx.execute(
        "DELETE FROM session_preferences WHERE session_id = ?1",
        params![session_id],
    )?;
    if removed > 0 {
        write_audit_log(&tx, "delete", session_id, None)?;
    }
    tx.commit()?;
    Ok(removed > 0)
}

/// Write an entry to the preference_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    session_id: &str,
    details: Option<&Value>,
) -> Result<(), StoreError> {
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO preference_log (operation, session_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, session_id, details_json, now],
    )?;
    Ok(())
}
