//! Session → agent bindings and the draft agent migrator.
//!
//! A draft conversation can pick an agent before the backend has assigned a
//! session id. When the first real id arrives, [`migrate_draft_agent`] moves
//! that choice into the binding store and discards it from the draft.

use serde::Serialize;

use crate::prefs::draft::DraftBuffer;
use crate::store::StoreError;

/// Per-session associative store of agent bindings.
pub trait AgentBindingStore: Send {
    fn bound_agent(&self, session_id: &str) -> Result<Option<String>, StoreError>;
    fn bind_agent(&mut self, session_id: &str, agent: &str) -> Result<(), StoreError>;
    /// Remove a binding (conversation deletion). Returns `true` if one existed.
    fn unbind_agent(&mut self, session_id: &str) -> Result<bool, StoreError>;
}

/// Which branch the migrator took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BindingOutcome {
    /// No prior binding; the draft's choice was bound.
    BoundDraft { agent: String },
    /// No prior binding and no draft choice; the system default was bound.
    BoundDefault { agent: String },
    /// An automatic default binding was replaced by the draft's explicit choice.
    OverrodeDefault { previous: String, agent: String },
    /// An existing binding was kept.
    KeptExisting { agent: String },
}

impl BindingOutcome {
    pub fn agent(&self) -> &str {
        match self {
            Self::BoundDraft { agent }
            | Self::BoundDefault { agent }
            | Self::OverrodeDefault { agent, .. }
            | Self::KeptExisting { agent } => agent,
        }
    }
}

/// Bind the draft's agent choice to a newly assigned session id.
///
/// - no binding yet: bind the draft choice, or `default_agent` without one
/// - bound to `default_agent`: a different draft choice overrides it
/// - bound to anything else: keep it
///
/// The draft's agent is discarded afterwards whichever branch ran. If the store
/// fails, the draft keeps its choice so the call can be retried.
pub fn migrate_draft_agent(
    bindings: &mut dyn AgentBindingStore,
    draft: &mut DraftBuffer,
    session_id: &str,
    default_agent: &str,
) -> Result<BindingOutcome, StoreError> {
    let draft_agent = draft.take_agent();

    let result = decide_and_bind(bindings, draft_agent.as_deref(), session_id, default_agent);
    match &result {
        Ok(outcome) => {
            tracing::info!(session = session_id, agent = outcome.agent(), ?outcome, "agent binding migrated");
        }
        Err(e) => {
            tracing::warn!(session = session_id, error = %e, "agent binding failed");
            draft.restore_agent(draft_agent);
        }
    }
    result
}

fn decide_and_bind(
    bindings: &mut dyn AgentBindingStore,
    draft_agent: Option<&str>,
    session_id: &str,
    default_agent: &str,
) -> Result<BindingOutcome, StoreError> {
    let explicit_draft = draft_agent.filter(|a| *a != default_agent);

    match bindings.bound_agent(session_id)? {
        None => {
            let outcome = match draft_agent {
                Some(agent) => BindingOutcome::BoundDraft {
                    agent: agent.to_string(),
                },
                None => BindingOutcome::BoundDefault {
                    agent: default_agent.to_string(),
                },
            };
            bindings.bind_agent(session_id, outcome.agent())?;
            Ok(outcome)
        }
        Some(existing) if existing == default_agent => match explicit_draft {
            Some(agent) => {
                bindings.bind_agent(session_id, agent)?;
                Ok(BindingOutcome::OverrodeDefault {
                    previous: existing,
                    agent: agent.to_string(),
                })
            }
            None => Ok(BindingOutcome::KeptExisting { agent: existing }),
        },
        Some(existing) => Ok(BindingOutcome::KeptExisting { agent: existing }),
    }
}
