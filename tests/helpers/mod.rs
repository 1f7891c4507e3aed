#![allow(dead_code)]

use prefsync::prefs::controller::PreferenceController;
use prefsync::prefs::types::{AgentCapabilities, CapabilityTable, PreferenceSet};
use prefsync::store::cache::{FileCache, SessionCache};
use prefsync::store::memory::{MemoryBindingStore, MemoryCache, MemoryServerStore};
use prefsync::store::sqlite::SqliteStore;
use prefsync::sync::PreferenceSync;
use std::path::Path;

pub const RESEARCH_AGENT: &str = "research-agent";
pub const CUSTOM_AGENT: &str = "custom-agent";
/// Agent that supports neither retrieval scope nor deep search.
pub const PLAIN_AGENT: &str = "plain-chat";

pub fn test_capabilities() -> CapabilityTable {
    CapabilityTable::new(AgentCapabilities::ALL).with_agent(PLAIN_AGENT, AgentCapabilities::NONE)
}

pub fn test_controller(cache: SessionCache) -> PreferenceController {
    PreferenceController::new(PreferenceSet::default(), test_capabilities(), cache)
}

/// A driver over in-memory stores, with clones kept for inspection.
pub struct Harness {
    pub sync: PreferenceSync<MemoryServerStore, MemoryBindingStore>,
    pub server: MemoryServerStore,
    pub bindings: MemoryBindingStore,
    pub cache: MemoryCache,
}

pub fn harness() -> Harness {
    let server = MemoryServerStore::new();
    let bindings = MemoryBindingStore::new();
    let cache = MemoryCache::new();
    let controller = test_controller(SessionCache::new(cache.clone(), "prefsync"));
    Harness {
        sync: PreferenceSync::new(controller, server.clone(), bindings.clone()),
        server,
        bindings,
        cache,
    }
}

/// A driver over a SQLite file and a file cache, both under `dir`.
/// Calling it twice on the same directory simulates a client restart.
pub fn sqlite_sync(dir: &Path) -> PreferenceSync<SqliteStore, SqliteStore> {
    let store = SqliteStore::open(dir.join("preferences.db")).unwrap();
    let cache = SessionCache::new(FileCache::new(dir.join("cache")), "prefsync");
    PreferenceSync::new(test_controller(cache), store.clone(), store)
}
