//! Async driver running a [`PreferenceController`] against real stores.
//!
//! Requests are executed one at a time in the order the controller emits them:
//! activation fetch → merge → forced first write, and edit → write → read-back.

use crate::prefs::binding::{AgentBindingStore, BindingOutcome};
use crate::prefs::controller::{HydrationOutcome, PersistRequest, PreferenceController, ReadBackOutcome};
use crate::prefs::hydration::FetchTicket;
use crate::prefs::types::{PreferenceEdit, PreferenceSet};
use crate::store::{PreferenceServer, StoreError};

/// What a driver call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub hydration: Option<HydrationOutcome>,
    /// A write reached the server store.
    pub persisted: bool,
    pub read_back: Option<ReadBackOutcome>,
}

pub struct PreferenceSync<S, B> {
    controller: PreferenceController,
    server: S,
    bindings: B,
}

impl<S, B> PreferenceSync<S, B>
where
    S: PreferenceServer,
    B: AgentBindingStore,
{
    pub fn new(controller: PreferenceController, server: S, bindings: B) -> Self {
        Self {
            controller,
            server,
            bindings,
        }
    }

    pub fn controller(&self) -> &PreferenceController {
        &self.controller
    }

    pub fn current(&self) -> &PreferenceSet {
        self.controller.current()
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn bindings(&self) -> &B {
        &self.bindings
    }

    /// Switch sessions, hydrate, and flush the forced first write if one is due.
    pub async fn activate(&mut self, session_id: Option<&str>) -> SyncReport {
        let Some(ticket) = self.controller.activate(session_id) else {
            return SyncReport::default();
        };
        self.hydrate(ticket).await
    }

    /// Retry the outstanding fetch after a failed activation.
    pub async fn retry_fetch(&mut self) -> SyncReport {
        let Some(ticket) = self.controller.pending_fetch() else {
            return SyncReport::default();
        };
        self.hydrate(ticket).await
    }

    async fn hydrate(&mut self, ticket: FetchTicket) -> SyncReport {
        let result = self.server.fetch_preferences(&ticket.session_id).await;
        let hydration = self.controller.complete_fetch(&ticket, result);
        let mut report = SyncReport {
            hydration: Some(hydration),
            ..Default::default()
        };
        if matches!(hydration, HydrationOutcome::Applied { .. }) {
            if let Some(request) = self.controller.evaluate() {
                self.persist(request, &mut report).await;
            }
        }
        report
    }

    /// Apply one edit and persist it if the diff gate says so.
    ///
    /// Agent changes on a live session also update the binding store.
    pub async fn edit(&mut self, edit: PreferenceEdit) -> SyncReport {
        if let (PreferenceEdit::Agent(agent), Some(session)) =
            (&edit, self.controller.hydrated_session())
        {
            if let Err(e) = self.bindings.bind_agent(session, agent) {
                tracing::warn!(session, error = %e, "failed to record agent binding");
            }
        }

        let mut report = SyncReport::default();
        if let Some(request) = self.controller.edit(edit) {
            self.persist(request, &mut report).await;
        }
        report
    }

    /// Re-run the diff gate, e.g. after a failed write.
    pub async fn flush(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        if let Some(request) = self.controller.retry() {
            self.persist(request, &mut report).await;
        }
        report
    }

    async fn persist(&mut self, request: PersistRequest, report: &mut SyncReport) {
        let result = self
            .server
            .persist_preferences(&request.session_id, &request.payload)
            .await;
        let Some(read_back) = self.controller.complete_persist(&request, result) else {
            return;
        };
        report.persisted = true;

        let fetched = self.server.fetch_preferences(&read_back.session_id).await;
        report.read_back = Some(self.controller.complete_read_back(&read_back, fetched));
    }

    /// Session-assigned signal: migrate the draft agent, then hydrate the new session.
    ///
    /// If the session is already active the bound agent is applied in place:
    /// a hydrated session writes it through the diff gate, one still awaiting
    /// its record retries the fetch and picks it up in the merge.
    pub async fn session_assigned(
        &mut self,
        session_id: &str,
    ) -> Result<(BindingOutcome, SyncReport), StoreError> {
        let outcome = self
            .controller
            .session_assigned(&mut self.bindings, session_id)?;
        let already_active = self.controller.active_session() == Some(session_id);
        let report = if !already_active {
            self.activate(Some(session_id)).await
        } else if self.controller.hydrated_session().is_some() {
            self.flush().await
        } else {
            self.retry_fetch().await
        };
        Ok((outcome, report))
    }

    /// Conversation deletion: drop the server record, binding, and cache entry.
    ///
    /// Every step runs even if an earlier one fails; the first error is returned.
    pub async fn forget(&mut self, session_id: &str) -> Result<bool, StoreError> {
        let record = self.server.delete_preferences(session_id).await;
        let binding = self.bindings.unbind_agent(session_id);
        self.controller.forget_session(session_id);

        if let Err(e) = &record {
            tracing::warn!(session = session_id, error = %e, "failed to delete server record");
        }
        if let Err(e) = &binding {
            tracing::warn!(session = session_id, error = %e, "failed to remove agent binding");
        }
        let had_record = record?;
        let had_binding = binding?;
        tracing::info!(session = session_id, had_record, had_binding, "session forgotten");
        Ok(had_record || had_binding)
    }
}
