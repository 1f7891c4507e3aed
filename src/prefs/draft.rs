//! Pre-session draft buffer.

use crate::prefs::types::{PartialPreferences, PreferenceEdit};

/// Edits made in a draft conversation, before any session identifier exists.
///
/// The buffer belongs to the draft conversation only. Opening an existing
/// session leaves it untouched and unused; it is handed over as a whole when a
/// session identifier is assigned to the draft.
#[derive(Debug, Clone, Default)]
pub struct DraftBuffer {
    prefs: PartialPreferences,
}

impl DraftBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefs(&self) -> &PartialPreferences {
        &self.prefs
    }

    pub fn record(&mut self, edit: &PreferenceEdit) {
        edit.record_into(&mut self.prefs);
    }

    pub fn agent(&self) -> Option<&str> {
        self.prefs.agent_name.as_deref()
    }

    pub fn take_agent(&mut self) -> Option<String> {
        self.prefs.agent_name.take()
    }

    pub(crate) fn restore_agent(&mut self, agent: Option<String>) {
        if self.prefs.agent_name.is_none() {
            self.prefs.agent_name = agent;
        }
    }

    /// Empty the buffer, returning what it held.
    pub fn take(&mut self) -> PartialPreferences {
        std::mem::take(&mut self.prefs)
    }

    pub fn is_empty(&self) -> bool {
        self.prefs.is_empty()
    }
}
