//! Core preference type definitions.
//!
//! Defines [`SearchPolicy`] and [`RagScope`] (the two fixed enumerations),
//! [`PartialPreferences`] (a record where every field may be absent),
//! [`PreferenceSet`] (a fully resolved value), [`PreferenceEdit`] (a single
//! user change), and [`AgentCapabilities`] (which optional fields an agent
//! understands).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Agent bound to a conversation when nothing else has been chosen.
pub const DEFAULT_AGENT: &str = "assistant-default";

/// How the retriever ranks candidate passages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPolicy {
    /// Vector similarity blended with keyword matching.
    Hybrid,
    /// Vector similarity only.
    Semantic,
    /// Exact keyword matching only.
    Strict,
}

impl SearchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Semantic => "semantic",
            Self::Strict => "strict",
        }
    }

    /// Parse a stored or user-supplied spelling, tolerating case and `-`/`_`.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match canonical_token(raw).as_str() {
            "hybrid" => Some(Self::Hybrid),
            "semantic" => Some(Self::Semantic),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(Self::Hybrid),
            "semantic" => Ok(Self::Semantic),
            "strict" => Ok(Self::Strict),
            _ => Err(format!("unknown search policy: {s}")),
        }
    }
}

/// Whether an agent answers from its knowledge corpus, general knowledge, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagScope {
    CorpusOnly,
    Hybrid,
    GeneralOnly,
}

impl RagScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CorpusOnly => "corpus_only",
            Self::Hybrid => "hybrid",
            Self::GeneralOnly => "general_only",
        }
    }

    /// Parse current and legacy spellings (`corpus`, `general`, `both`).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match canonical_token(raw).as_str() {
            "corpus_only" | "corpus" => Some(Self::CorpusOnly),
            "hybrid" | "both" => Some(Self::Hybrid),
            "general_only" | "general" => Some(Self::GeneralOnly),
            _ => None,
        }
    }
}

impl std::fmt::Display for RagScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RagScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "corpus_only" => Ok(Self::CorpusOnly),
            "hybrid" => Ok(Self::Hybrid),
            "general_only" => Ok(Self::GeneralOnly),
            _ => Err(format!("unknown retrieval scope: {s}")),
        }
    }
}

fn canonical_token(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

/// Remove empty and duplicate ids, keeping the first occurrence of each.
pub fn dedup_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        let id = id.into();
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Treat an empty identifier the same as "no session yet".
pub fn normalize_session_id(session_id: Option<&str>) -> Option<&str> {
    session_id.map(str::trim).filter(|s| !s.is_empty())
}

/// Which optional fields an agent understands.
///
/// Unsupported fields are neither sent to the server nor compared by the diff gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCapabilities {
    pub rag_scope: bool,
    pub deep_search: bool,
}

impl AgentCapabilities {
    pub const ALL: Self = Self {
        rag_scope: true,
        deep_search: true,
    };

    pub const NONE: Self = Self {
        rag_scope: false,
        deep_search: false,
    };
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/// Per-agent capability lookup with a fallback for agents nobody registered.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    agents: HashMap<String, AgentCapabilities>,
    fallback: AgentCapabilities,
}

impl CapabilityTable {
    pub fn new(fallback: AgentCapabilities) -> Self {
        Self {
            agents: HashMap::new(),
            fallback,
        }
    }

    pub fn with_agent(mut self, name: impl Into<String>, caps: AgentCapabilities) -> Self {
        self.agents.insert(name.into(), caps);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, caps: AgentCapabilities) {
        self.agents.insert(name.into(), caps);
    }

    pub fn for_agent(&self, name: &str) -> AgentCapabilities {
        self.agents.get(name).copied().unwrap_or(self.fallback)
    }
}

/// A preference record where every field may be absent.
///
/// Absent means "no opinion", which is different from an explicitly empty list.
/// Used for server records, the draft buffer, and local cache entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_library_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_resource_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_resource_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_policy: Option<SearchPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_rag_scope: Option<RagScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

impl PartialPreferences {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Copy every field present in `newer` over this record.
    pub fn overlay(&mut self, newer: &PartialPreferences) {
        let newer = newer.clone();
        if newer.document_library_ids.is_some() {
            self.document_library_ids = newer.document_library_ids;
        }
        if newer.prompt_resource_ids.is_some() {
            self.prompt_resource_ids = newer.prompt_resource_ids;
        }
        if newer.template_resource_ids.is_some() {
            self.template_resource_ids = newer.template_resource_ids;
        }
        if newer.search_policy.is_some() {
            self.search_policy = newer.search_policy;
        }
        if newer.search_rag_scope.is_some() {
            self.search_rag_scope = newer.search_rag_scope;
        }
        if newer.deep_search.is_some() {
            self.deep_search = newer.deep_search;
        }
        if newer.agent_name.is_some() {
            self.agent_name = newer.agent_name;
        }
    }
}

/// A fully resolved preference value: what the UI shows and what gets persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceSet {
    pub document_library_ids: Vec<String>,
    pub prompt_resource_ids: Vec<String>,
    pub template_resource_ids: Vec<String>,
    pub search_policy: SearchPolicy,
    pub search_rag_scope: RagScope,
    pub deep_search: bool,
    pub agent_name: String,
}

impl Default for PreferenceSet {
    fn default() -> Self {
        Self {
            document_library_ids: Vec::new(),
            prompt_resource_ids: Vec::new(),
            template_resource_ids: Vec::new(),
            search_policy: SearchPolicy::Hybrid,
            search_rag_scope: RagScope::Hybrid,
            deep_search: false,
            agent_name: DEFAULT_AGENT.into(),
        }
    }
}

impl PreferenceSet {
    /// Overlay every field present in `partial`.
    pub fn apply(&mut self, partial: &PartialPreferences) {
        if let Some(ids) = &partial.document_library_ids {
            self.document_library_ids = dedup_ids(ids.iter().cloned());
        }
        if let Some(ids) = &partial.prompt_resource_ids {
            self.prompt_resource_ids = dedup_ids(ids.iter().cloned());
        }
        if let Some(ids) = &partial.template_resource_ids {
            self.template_resource_ids = dedup_ids(ids.iter().cloned());
        }
        if let Some(policy) = partial.search_policy {
            self.search_policy = policy;
        }
        if let Some(scope) = partial.search_rag_scope {
            self.search_rag_scope = scope;
        }
        if let Some(deep) = partial.deep_search {
            self.deep_search = deep;
        }
        if let Some(agent) = partial.agent_name.as_deref().filter(|a| !a.is_empty()) {
            self.agent_name = agent.to_string();
        }
    }

    pub fn to_partial(&self) -> PartialPreferences {
        PartialPreferences {
            document_library_ids: Some(self.document_library_ids.clone()),
            prompt_resource_ids: Some(self.prompt_resource_ids.clone()),
            template_resource_ids: Some(self.template_resource_ids.clone()),
            search_policy: Some(self.search_policy),
            search_rag_scope: Some(self.search_rag_scope),
            deep_search: Some(self.deep_search),
            agent_name: Some(self.agent_name.clone()),
        }
    }

    /// The fields this agent understands, keyed by wire name in sorted order.
    pub fn effective(&self, caps: AgentCapabilities) -> BTreeMap<&'static str, Value> {
        let mut fields = BTreeMap::new();
        fields.insert("agentName", Value::from(self.agent_name.clone()));
        fields.insert(
            "documentLibraryIds",
            Value::from(self.document_library_ids.clone()),
        );
        fields.insert(
            "promptResourceIds",
            Value::from(self.prompt_resource_ids.clone()),
        );
        fields.insert("searchPolicy", Value::from(self.search_policy.as_str()));
        fields.insert(
            "templateResourceIds",
            Value::from(self.template_resource_ids.clone()),
        );
        if caps.rag_scope {
            fields.insert("searchRagScope", Value::from(self.search_rag_scope.as_str()));
        }
        if caps.deep_search {
            fields.insert("deepSearch", Value::from(self.deep_search));
        }
        fields
    }

    /// Full-replace payload for the server store.
    pub fn payload(&self, caps: AgentCapabilities) -> Value {
        Value::Object(
            self.effective(caps)
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Canonical serialization used for change detection.
    pub fn canonical(&self, caps: AgentCapabilities) -> String {
        // BTreeMap keeps keys sorted regardless of serde_json's map features.
        serde_json::to_string(&self.effective(caps)).unwrap_or_default()
    }
}

/// One user change to a preference field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceEdit {
    DocumentLibraries(Vec<String>),
    PromptResources(Vec<String>),
    TemplateResources(Vec<String>),
    SearchPolicy(SearchPolicy),
    RagScope(RagScope),
    DeepSearch(bool),
    Agent(String),
}

impl PreferenceEdit {
    pub fn apply_to(&self, set: &mut PreferenceSet) {
        set.apply(&self.as_partial());
    }

    pub fn record_into(&self, partial: &mut PartialPreferences) {
        match self.clone() {
            Self::DocumentLibraries(ids) => partial.document_library_ids = Some(dedup_ids(ids)),
            Self::PromptResources(ids) => partial.prompt_resource_ids = Some(dedup_ids(ids)),
            Self::TemplateResources(ids) => partial.template_resource_ids = Some(dedup_ids(ids)),
            Self::SearchPolicy(policy) => partial.search_policy = Some(policy),
            Self::RagScope(scope) => partial.search_rag_scope = Some(scope),
            Self::DeepSearch(deep) => partial.deep_search = Some(deep),
            Self::Agent(agent) => {
                partial.agent_name = Some(agent).filter(|a| !a.is_empty());
            }
        }
    }

    fn as_partial(&self) -> PartialPreferences {
        let mut partial = PartialPreferences::default();
        self.record_into(&mut partial);
        partial
    }
}
