//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::{params, Connection};

use crate::prefs::merge::{has_legacy_fields, normalize_record};

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: rewrite legacy retrieval-scope encodings
/// (`skip_rag_search`, `ragScope`, old value spellings) into `searchRagScope`.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    let rows: Vec<(String, String)> = conn
        .prepare("SELECT session_id, payload FROM session_preferences")?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let now = chrono::Utc::now().to_rfc3339();
    let mut rewritten = 0usize;
    for (session_id, payload) in rows {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&payload) else {
            tracing::warn!(session = %session_id, "skipping unreadable preference payload");
            continue;
        };
        if !has_legacy_fields(&value) {
            continue;
        }
        let normalized = normalize_record(&value);
        let Ok(json) = serde_json::to_string(&normalized) else {
            continue;
        };
        conn.execute(
            "UPDATE session_preferences SET payload = ?1, updated_at = ?2 WHERE session_id = ?3",
            params![json, now, session_id],
        )?;
        conn.execute(
            "INSERT INTO preference_log (operation, session_id, details, created_at) VALUES ('normalize', ?1, ?2, ?3)",
            params![session_id, payload, now],
        )?;
        rewritten += 1;
    }

    tracing::info!(rewritten, "normalized legacy preference payloads");
    Ok(())
}
