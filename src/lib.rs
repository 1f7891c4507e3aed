//! Per-conversation preference synchronization for chat clients.
//!
//! Each conversation carries a small preference record: selected document
//! libraries, prompt and template resources, a search policy, a retrieval
//! scope, a deep-search toggle, and the agent that answers. prefsync keeps
//! three copies of that record consistent:
//!
//! | Copy | Owner | Role |
//! |------|-------|------|
//! | **Server record** | [`store::PreferenceServer`] | Authoritative, per session |
//! | **Local cache** | [`store::cache::SessionCache`] | Fast provisional restore |
//! | **Live state** | [`prefs::controller::PreferenceController`] | What the UI shows |
//!
//! Choices made before a conversation has an identifier live in a draft
//! buffer and are folded in when the session is assigned.
//!
//! # Architecture
//!
//! - **Controller**: sans-IO; emits fetch, write, and read-back requests and
//!   accepts their results, dropping any that arrive for a stale session
//! - **Merge**: server over draft over defaults, field by field; the cache
//!   only seeds live state until the server answers
//! - **Writes**: gated on a canonical, capability-restricted serialization
//! - **Storage**: SQLite (WAL) for the server store and agent bindings,
//!   one JSON file per session for the local cache
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files and environment variables
//! - [`db`] - SQLite database initialization, schema, migrations, and health checks
//! - [`prefs`] - Preference types, merge rules, and the synchronization state machines
//! - [`store`] - Server store, binding store, and local cache implementations
//! - [`sync`] - Async driver running the controller against real stores

pub mod config;
pub mod db;
pub mod prefs;
pub mod store;
pub mod sync;
