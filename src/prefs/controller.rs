//! Sans-IO preference synchronization controller.
//!
//! [`PreferenceController`] owns live preference state and decides when the
//! server must be read or written, but never awaits anything itself. Each
//! operation returns a request (a [`FetchTicket`], [`PersistRequest`], or
//! [`ReadBackRequest`]); the caller performs it and feeds the result back
//! through the matching `complete_*` method. Results that no longer match the
//! active session or the latest write are dropped.
//!
//! [`crate::sync::PreferenceSync`] is the async driver that does exactly that.

use serde_json::Value;

use crate::prefs::binding::{migrate_draft_agent, AgentBindingStore, BindingOutcome};
use crate::prefs::draft::DraftBuffer;
use crate::prefs::gate::{DiffGate, WriteTicket};
use crate::prefs::hydration::{Activation, FetchTicket, HydrationGuard, SessionPhase};
use crate::prefs::merge::{merge_preferences, normalize_record, MergeSources};
use crate::prefs::types::{
    normalize_session_id, AgentCapabilities, CapabilityTable, PartialPreferences, PreferenceEdit,
    PreferenceSet,
};
use crate::store::cache::SessionCache;
use crate::store::StoreError;

/// A write the caller must send to the server store.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistRequest {
    pub session_id: String,
    pub payload: Value,
    pub ticket: WriteTicket,
    /// Local edit counter when the write was issued.
    pub edit_seq: u64,
}

/// A fetch the caller must issue after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBackRequest {
    pub session_id: String,
    pub write_token: u64,
    pub edit_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// Merge ran and live state now reflects the session.
    Applied { server_had_record: bool },
    /// Session already hydrated; nothing changed.
    AlreadyHydrated,
    /// The fetch belonged to an abandoned activation.
    Stale,
    /// The fetch failed; still awaiting the server.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBackOutcome {
    /// Live state replaced with the server's representation.
    Applied,
    /// Newer local edits exist; only the snapshot and cache were updated.
    /// Call [`PreferenceController::evaluate`] to persist the newer edits.
    BookkeepingOnly,
    Stale,
    Failed,
}

pub struct PreferenceController {
    defaults: PreferenceSet,
    capabilities: CapabilityTable,
    cache: SessionCache,
    draft: DraftBuffer,
    guard: HydrationGuard,
    gate: DiffGate,
    live: PreferenceSet,
    edit_seq: u64,
    /// Draft handed over by `session_assigned`, consumed by that session's hydration.
    seed: Option<(String, PartialPreferences)>,
    /// Edits made while the current activation awaits the server.
    pending: Option<(FetchTicket, PartialPreferences)>,
}

impl PreferenceController {
    pub fn new(defaults: PreferenceSet, capabilities: CapabilityTable, cache: SessionCache) -> Self {
        Self {
            live: defaults.clone(),
            defaults,
            capabilities,
            cache,
            draft: DraftBuffer::new(),
            guard: HydrationGuard::new(),
            gate: DiffGate::new(),
            edit_seq: 0,
            seed: None,
            pending: None,
        }
    }

    /// Live, UI-visible preference state.
    pub fn current(&self) -> &PreferenceSet {
        &self.live
    }

    pub fn defaults(&self) -> &PreferenceSet {
        &self.defaults
    }

    pub fn phase(&self) -> &SessionPhase {
        self.guard.phase()
    }

    pub fn active_session(&self) -> Option<&str> {
        self.guard.active_session()
    }

    pub fn hydrated_session(&self) -> Option<&str> {
        self.guard.hydrated_session()
    }

    pub fn draft(&self) -> &DraftBuffer {
        &self.draft
    }

    /// Edits waiting for the current activation's server record.
    pub fn pending_edits(&self) -> Option<&PartialPreferences> {
        self.pending.as_ref().map(|(_, prefs)| prefs)
    }

    pub fn last_persisted(&self) -> Option<&str> {
        self.gate.last_persisted()
    }

    pub fn capabilities(&self) -> AgentCapabilities {
        self.capabilities.for_agent(&self.live.agent_name)
    }

    /// Canonical form of the live value, restricted to what the agent supports.
    pub fn canonical(&self) -> String {
        self.live.canonical(self.capabilities())
    }

    /// Switch the active session. Returns the fetch to issue, if any.
    ///
    /// Live fields are not reset to defaults on a switch; a cached entry for the
    /// new session, if present, is applied provisionally until the fetch lands.
    pub fn activate(&mut self, session_id: Option<&str>) -> Option<FetchTicket> {
        let activation = self.guard.activate(normalize_session_id(session_id));
        if activation != Activation::Unchanged && self.pending.take().is_some() {
            tracing::debug!("dropping edits made for an abandoned activation");
        }
        match activation {
            Activation::Unchanged => None,
            Activation::Detached => {
                self.gate.reset();
                self.live = merge_preferences(
                    &MergeSources {
                        draft: Some(self.draft.prefs()),
                        ..Default::default()
                    },
                    &self.defaults,
                );
                None
            }
            Activation::Fetch(ticket) => {
                self.gate.reset();
                self.live = self.defaults.clone();
                if let Some(cached) = self.cache.load(&ticket.session_id) {
                    tracing::debug!(session = %ticket.session_id, "provisional restore from local cache");
                    self.live.apply(&cached);
                }
                Some(ticket)
            }
        }
    }

    /// Re-issue the outstanding fetch after a failure.
    pub fn pending_fetch(&self) -> Option<FetchTicket> {
        self.guard.pending_fetch()
    }

    /// Feed back the server record for an activation and, once per
    /// activation, merge and apply it.
    pub fn complete_fetch(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Option<Value>, StoreError>,
    ) -> HydrationOutcome {
        if !self.guard.is_current(ticket) {
            tracing::debug!(session = %ticket.session_id, generation = ticket.generation, "discarding stale fetch");
            return HydrationOutcome::Stale;
        }
        if self.guard.hydrated_session().is_some() {
            return HydrationOutcome::AlreadyHydrated;
        }

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(session = %ticket.session_id, error = %e, "preference fetch failed");
                return HydrationOutcome::Failed;
            }
        };
        let server = record.as_ref().map(normalize_record).unwrap_or_default();
        let server_had_record = !server.is_empty();

        // Only the session the draft was assigned to inherits it.
        let mut draft = match self.seed.take() {
            Some((session, seed)) if session == ticket.session_id => seed,
            Some(other) => {
                self.seed = Some(other);
                PartialPreferences::default()
            }
            None => PartialPreferences::default(),
        };
        if let Some((pending_ticket, edits)) = self.pending.take() {
            if pending_ticket == *ticket {
                draft.overlay(&edits);
            }
        }

        let merged = merge_preferences(
            &MergeSources {
                server: Some(&server),
                draft: Some(&draft),
            },
            &self.defaults,
        );

        self.guard.complete(ticket);
        self.live = merged;
        self.cache.store(&ticket.session_id, &self.live.to_partial());
        let canonical = self.canonical();
        self.gate.hydrated(canonical, server_had_record);

        tracing::info!(session = %ticket.session_id, server_had_record, "preferences hydrated");
        HydrationOutcome::Applied { server_had_record }
    }

    /// Apply one user edit. Returns a write if the change must be persisted.
    ///
    /// Without a session the edit goes to the draft buffer. While a session
    /// awaits its server record the edit is held for that activation only and
    /// merged at draft precedence once the record lands. Neither is written.
    pub fn edit(&mut self, edit: PreferenceEdit) -> Option<PersistRequest> {
        edit.apply_to(&mut self.live);
        self.edit_seq += 1;

        if self.guard.hydrated_session().is_some() {
            return self.evaluate();
        }
        match self.guard.pending_fetch() {
            None => self.draft.record(&edit),
            Some(ticket) => {
                let (_, edits) = self
                    .pending
                    .get_or_insert_with(|| (ticket, PartialPreferences::default()));
                edit.record_into(edits);
            }
        }
        None
    }

    /// Run the diff gate against live state.
    pub fn evaluate(&mut self) -> Option<PersistRequest> {
        let session_id = self.guard.hydrated_session()?.to_string();
        let caps = self.capabilities();
        let canonical = self.live.canonical(caps);
        let ticket = self.gate.check(&canonical)?;

        tracing::debug!(session = %session_id, token = ticket.token, forced = ticket.forced, "issuing preference write");
        Some(PersistRequest {
            session_id,
            payload: self.live.payload(caps),
            ticket,
            edit_seq: self.edit_seq,
        })
    }

    /// Re-evaluate after a failed write.
    pub fn retry(&mut self) -> Option<PersistRequest> {
        self.evaluate()
    }

    /// Feed back the outcome of a write. Returns the read-back to issue on success.
    pub fn complete_persist(
        &mut self,
        request: &PersistRequest,
        result: Result<(), StoreError>,
    ) -> Option<ReadBackRequest> {
        if self.guard.hydrated_session() != Some(request.session_id.as_str()) {
            tracing::debug!(session = %request.session_id, "discarding write result for inactive session");
            return None;
        }

        match result {
            Ok(()) => {
                if !self.gate.succeeded(&request.ticket) {
                    tracing::debug!(token = request.ticket.token, "write superseded by a newer one");
                    return None;
                }
                self.cache
                    .store(&request.session_id, &normalize_record(&request.payload));
                Some(ReadBackRequest {
                    session_id: request.session_id.clone(),
                    write_token: request.ticket.token,
                    edit_seq: request.edit_seq,
                })
            }
            Err(e) => {
                self.gate.failed(&request.ticket);
                tracing::warn!(session = %request.session_id, error = %e, "preference write failed; will retry on next change");
                None
            }
        }
    }

    /// Feed back the read-back fetch that follows a successful write.
    ///
    /// Snapshot and cache always adopt the server's representation. Live state
    /// does too, unless the user edited something after the write was issued.
    pub fn complete_read_back(
        &mut self,
        request: &ReadBackRequest,
        result: Result<Option<Value>, StoreError>,
    ) -> ReadBackOutcome {
        if self.guard.hydrated_session() != Some(request.session_id.as_str())
            || !self.gate.is_latest(request.write_token)
        {
            tracing::debug!(session = %request.session_id, token = request.write_token, "discarding stale read-back");
            return ReadBackOutcome::Stale;
        }

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(session = %request.session_id, error = %e, "read-back failed");
                return ReadBackOutcome::Failed;
            }
        };
        let server = record.as_ref().map(normalize_record).unwrap_or_default();

        let mut confirmed = self.live.clone();
        confirmed.apply(&server);
        let caps = self.capabilities.for_agent(&confirmed.agent_name);
        self.gate.confirmed(confirmed.canonical(caps));
        self.cache.store(&request.session_id, &confirmed.to_partial());

        if self.edit_seq == request.edit_seq {
            self.live = confirmed;
            ReadBackOutcome::Applied
        } else {
            ReadBackOutcome::BookkeepingOnly
        }
    }

    /// Handle the session-assigned signal: bind the draft's agent choice to the
    /// new identifier and hand the rest of the draft to that session.
    ///
    /// If the session is already hydrated the bound agent is applied to live
    /// state directly and the caller should run [`Self::evaluate`]; the other
    /// draft fields are dropped since the server record already won. Otherwise
    /// the draft is merged when the session's fetch lands, so the caller
    /// activates the session afterwards.
    pub fn session_assigned(
        &mut self,
        bindings: &mut dyn AgentBindingStore,
        session_id: &str,
    ) -> Result<BindingOutcome, StoreError> {
        let outcome =
            migrate_draft_agent(bindings, &mut self.draft, session_id, &self.defaults.agent_name)?;
        let mut seed = self.draft.take();
        seed.agent_name = Some(outcome.agent().to_string());

        if self.guard.hydrated_session() == Some(session_id) {
            PreferenceEdit::Agent(outcome.agent().to_string()).apply_to(&mut self.live);
            self.edit_seq += 1;
            self.seed = None;
        } else {
            self.seed = Some((session_id.to_string(), seed));
        }
        Ok(outcome)
    }

    /// Drop local traces of a deleted conversation.
    pub fn forget_session(&mut self, session_id: &str) {
        self.cache.evict(session_id);
        if self
            .seed
            .as_ref()
            .is_some_and(|(session, _)| session == session_id)
        {
            self.seed = None;
        }
        if self.guard.active_session() == Some(session_id) {
            self.activate(None);
        }
    }

    /// Cached record for a session, as the next activation would see it.
    pub fn cached(&self, session_id: &str) -> Option<PartialPreferences> {
        self.cache.load(session_id)
    }
}
