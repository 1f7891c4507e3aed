pub mod bind;
pub mod doctor;
pub mod forget;
pub mod set;
pub mod show;

use anyhow::{Context, Result};

use prefsync::config::PrefsyncConfig;
use prefsync::prefs::controller::PreferenceController;
use prefsync::prefs::types::PreferenceSet;
use prefsync::store::cache::{FileCache, SessionCache};
use prefsync::store::sqlite::SqliteStore;
use prefsync::sync::PreferenceSync;

pub type CliSync = PreferenceSync<SqliteStore, SqliteStore>;

/// Build a driver over the configured database and cache directory.
///
/// The same SQLite connection serves as both the server store and the
/// binding store.
pub fn open_sync(config: &PrefsyncConfig) -> Result<CliSync> {
    let db_path = config.resolved_db_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open preference store at {}", db_path.display()))?;

    let cache = SessionCache::new(
        FileCache::new(config.resolved_cache_dir()),
        config.storage.cache_namespace.clone(),
    );
    let controller = PreferenceController::new(
        config.preference_defaults(),
        config.capability_table(),
        cache,
    );
    Ok(PreferenceSync::new(controller, store.clone(), store))
}

pub fn print_preferences(prefs: &PreferenceSet) {
    println!("  Agent:             {}", prefs.agent_name);
    println!("  Search policy:     {}", prefs.search_policy);
    println!("  Retrieval scope:   {}", prefs.search_rag_scope);
    println!("  Deep search:       {}", if prefs.deep_search { "on" } else { "off" });
    println!("  Libraries:         {}", format_ids(&prefs.document_library_ids));
    println!("  Prompts:           {}", format_ids(&prefs.prompt_resource_ids));
    println!("  Templates:         {}", format_ids(&prefs.template_resource_ids));
}

fn format_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        "(none)".into()
    } else {
        ids.join(", ")
    }
}
