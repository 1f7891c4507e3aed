use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::prefs::types::{
    dedup_ids, AgentCapabilities, CapabilityTable, PreferenceSet, RagScope, SearchPolicy,
    DEFAULT_AGENT,
};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PrefsyncConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub defaults: DefaultsConfig,
    /// Capabilities for agents not listed in `agents`.
    pub capabilities: AgentCapabilities,
    pub agents: Vec<AgentProfile>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub cache_dir: String,
    pub cache_namespace: String,
}

/// Built-in preference defaults, the lowest precedence level of every merge.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DefaultsConfig {
    pub document_library_ids: Vec<String>,
    pub prompt_resource_ids: Vec<String>,
    pub template_resource_ids: Vec<String>,
    pub search_policy: SearchPolicy,
    pub search_rag_scope: RagScope,
    pub deep_search: bool,
    pub agent_name: String,
}

/// Which optional preference fields an agent understands.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentProfile {
    pub name: String,
    #[serde(default = "default_true")]
    pub rag_scope: bool,
    #[serde(default = "default_true")]
    pub deep_search: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PrefsyncConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            defaults: DefaultsConfig::default(),
            capabilities: AgentCapabilities::ALL,
            agents: vec![AgentProfile {
                name: DEFAULT_AGENT.into(),
                rag_scope: true,
                deep_search: true,
            }],
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_prefsync_dir();
        Self {
            db_path: dir.join("preferences.db").to_string_lossy().into_owned(),
            cache_dir: dir.join("cache").to_string_lossy().into_owned(),
            cache_namespace: "prefsync".into(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let set = PreferenceSet::default();
        Self {
            document_library_ids: set.document_library_ids,
            prompt_resource_ids: set.prompt_resource_ids,
            template_resource_ids: set.template_resource_ids,
            search_policy: set.search_policy,
            search_rag_scope: set.search_rag_scope,
            deep_search: set.deep_search,
            agent_name: set.agent_name,
        }
    }
}

/// Returns `~/.prefsync/`
pub fn default_prefsync_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".prefsync")
}

/// Returns the default config file path: `~/.prefsync/config.toml`
pub fn default_config_path() -> PathBuf {
    default_prefsync_dir().join("config.toml")
}

impl PrefsyncConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            PrefsyncConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (PREFSYNC_DB, PREFSYNC_CACHE_DIR, PREFSYNC_DEFAULT_AGENT, PREFSYNC_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PREFSYNC_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("PREFSYNC_CACHE_DIR") {
            self.storage.cache_dir = val;
        }
        if let Ok(val) = std::env::var("PREFSYNC_DEFAULT_AGENT") {
            self.defaults.agent_name = val;
        }
        if let Ok(val) = std::env::var("PREFSYNC_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.cache_dir)
    }

    /// The defaults record handed to every merge.
    pub fn preference_defaults(&self) -> PreferenceSet {
        let d = &self.defaults;
        let agent_name = if d.agent_name.trim().is_empty() {
            DEFAULT_AGENT.to_string()
        } else {
            d.agent_name.trim().to_string()
        };
        PreferenceSet {
            document_library_ids: dedup_ids(d.document_library_ids.iter().cloned()),
            prompt_resource_ids: dedup_ids(d.prompt_resource_ids.iter().cloned()),
            template_resource_ids: dedup_ids(d.template_resource_ids.iter().cloned()),
            search_policy: d.search_policy,
            search_rag_scope: d.search_rag_scope,
            deep_search: d.deep_search,
            agent_name,
        }
    }

    pub fn capability_table(&self) -> CapabilityTable {
        let mut table = CapabilityTable::new(self.capabilities);
        for agent in &self.agents {
            table.insert(
                agent.name.clone(),
                AgentCapabilities {
                    rag_scope: agent.rag_scope,
                    deep_search: agent.deep_search,
                },
            );
        }
        table
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
