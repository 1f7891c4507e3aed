//! Storage seams: the authoritative server store and the local durable cache.
//!
//! The controller never talks to storage directly. The async driver calls a
//! [`PreferenceServer`]; the controller owns a [`cache::SessionCache`] wrapping
//! any [`cache::LocalCache`]. SQLite and in-memory implementations live in
//! [`sqlite`] and [`memory`].

pub mod cache;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

/// Failure talking to the server store or the binding store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(String),
}

/// The authoritative, multi-device preferences record keyed by session id.
#[async_trait]
pub trait PreferenceServer: Send + Sync {
    /// Fetch the stored record. `Ok(None)` means no record exists yet.
    ///
    /// A record may hold any subset of fields; missing fields mean "no opinion".
    async fn fetch_preferences(&self, session_id: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the tracked fields with `preferences`.
    async fn persist_preferences(&self, session_id: &str, preferences: &Value)
        -> Result<(), StoreError>;

    /// Remove the record (conversation deletion). Returns `true` if one existed.
    async fn delete_preferences(&self, session_id: &str) -> Result<bool, StoreError>;
}
