//! In-memory stores.
//!
//! Cheap to clone: clones share state, so a test can hand one clone to the
//! controller and keep another to inspect calls and inject failures.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::cache::{CacheError, LocalCache};
use super::{PreferenceServer, StoreError};
use crate::prefs::binding::AgentBindingStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct ServerState {
    records: HashMap<String, Value>,
    fetches: usize,
    writes: Vec<(String, Value)>,
    fail_fetches: bool,
    fail_writes: bool,
}

/// Server store held in a map. Records every write for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryServerStore {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw record, bypassing the write log.
    pub fn insert_record(&self, session_id: &str, record: Value) {
        lock(&self.state).records.insert(session_id.to_string(), record);
    }

    pub fn record(&self, session_id: &str) -> Option<Value> {
        lock(&self.state).records.get(session_id).cloned()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.state).writes.len()
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        lock(&self.state).writes.clone()
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.state).fetches
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        lock(&self.state).fail_fetches = fail;
    }
}

#[async_trait]
impl PreferenceServer for MemoryServerStore {
    async fn fetch_preferences(&self, session_id: &str) -> Result<Option<Value>, StoreError> {
        let mut state = lock(&self.state);
        state.fetches += 1;
        if state.fail_fetches {
            return Err(StoreError::Unavailable("fetch rejected".into()));
        }
        Ok(state.records.get(session_id).cloned())
    }

    async fn persist_preferences(
        &self,
        session_id: &str,
        preferences: &Value,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(StoreError::Unavailable("write rejected".into()));
        }
        state
            .writes
            .push((session_id.to_string(), preferences.clone()));
        state
            .records
            .insert(session_id.to_string(), preferences.clone());
        Ok(())
    }

    async fn delete_preferences(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(StoreError::Unavailable("delete rejected".into()));
        }
        Ok(state.records.remove(session_id).is_some())
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, String>,
    unavailable: bool,
}

/// Local cache held in a map; can be switched to "unavailable".
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    state: Arc<Mutex<CacheState>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.state).entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(CacheError::Unavailable("storage disabled".into()));
        }
        Ok(state.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut state = lock(&self.state);
        if state.unavailable {
            return Err(CacheError::Unavailable("quota exceeded".into()));
        }
        state.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        let mut state = lock(&self.state);
        if state.unavailable {
            return Err(CacheError::Unavailable("storage disabled".into()));
        }
        state.entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BindingState {
    agents: HashMap<String, String>,
    unavailable: bool,
}

/// Session → agent map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBindingStore {
    state: Arc<Mutex<BindingState>>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    pub fn len(&self) -> usize {
        lock(&self.state).agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AgentBindingStore for MemoryBindingStore {
    fn bound_agent(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(StoreError::Unavailable("binding store offline".into()));
        }
        Ok(state.agents.get(session_id).cloned())
    }

    fn bind_agent(&mut self, session_id: &str, agent: &str) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.unavailable {
            return Err(StoreError::Unavailable("binding store offline".into()));
        }
        state
            .agents
            .insert(session_id.to_string(), agent.to_string());
        Ok(())
    }

    fn unbind_agent(&mut self, session_id: &str) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        if state.unavailable {
            return Err(StoreError::Unavailable("binding store offline".into()));
        }
        Ok(state.agents.remove(session_id).is_some())
    }
}
