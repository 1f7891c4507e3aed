//! Session-switch state machine.
//!
//! ```text
//! NoSession ──activate(id)──▶ AwaitingServer{id, gen} ──fetch(gen)──▶ Hydrated{id, gen}
//!     ▲                              │  ▲                                   │
//!     └──────activate(None)──────────┘  └──────────activate(other)──────────┘
//! ```
//!
//! Every activation of a different identifier bumps the generation. A fetch
//! result only completes hydration when its ticket names the current session
//! and generation; anything else is stale.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No conversation yet; the UI runs on the draft buffer and defaults.
    NoSession,
    /// Identifier changed; waiting for the server record.
    AwaitingServer { session_id: String, generation: u64 },
    /// The merged value for this session is reflected in live state.
    Hydrated { session_id: String, generation: u64 },
}

/// Identity of one server fetch issued for a session activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub session_id: String,
    pub generation: u64,
}

/// What an activation request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Same identifier as before; nothing to do.
    Unchanged,
    /// Moved to `NoSession`.
    Detached,
    /// Moved to `AwaitingServer`; the fetch must be issued.
    Fetch(FetchTicket),
}

#[derive(Debug)]
pub struct HydrationGuard {
    phase: SessionPhase,
    generation: u64,
}

impl Default for HydrationGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl HydrationGuard {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::NoSession,
            generation: 0,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn active_session(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::NoSession => None,
            SessionPhase::AwaitingServer { session_id, .. }
            | SessionPhase::Hydrated { session_id, .. } => Some(session_id),
        }
    }

    /// The hydration marker: which session's value live state reflects.
    pub fn hydrated_session(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::Hydrated { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    pub fn activate(&mut self, session_id: Option<&str>) -> Activation {
        if self.active_session() == session_id {
            return Activation::Unchanged;
        }

        self.generation += 1;
        match session_id {
            None => {
                tracing::debug!(generation = self.generation, "session detached");
                self.phase = SessionPhase::NoSession;
                Activation::Detached
            }
            Some(id) => {
                tracing::debug!(session = id, generation = self.generation, "awaiting server record");
                self.phase = SessionPhase::AwaitingServer {
                    session_id: id.to_string(),
                    generation: self.generation,
                };
                Activation::Fetch(FetchTicket {
                    session_id: id.to_string(),
                    generation: self.generation,
                })
            }
        }
    }

    /// The outstanding fetch, if hydration has not completed yet.
    pub fn pending_fetch(&self) -> Option<FetchTicket> {
        match &self.phase {
            SessionPhase::AwaitingServer {
                session_id,
                generation,
            } => Some(FetchTicket {
                session_id: session_id.clone(),
                generation: *generation,
            }),
            _ => None,
        }
    }

    /// `true` if the ticket belongs to the current activation.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        match &self.phase {
            SessionPhase::NoSession => false,
            SessionPhase::AwaitingServer {
                session_id,
                generation,
            }
            | SessionPhase::Hydrated {
                session_id,
                generation,
            } => *session_id == ticket.session_id && *generation == ticket.generation,
        }
    }

    /// Transition `AwaitingServer → Hydrated`. Returns `false` for stale or
    /// duplicate completions.
    pub fn complete(&mut self, ticket: &FetchTicket) -> bool {
        match &self.phase {
            SessionPhase::AwaitingServer {
                session_id,
                generation,
            } if *session_id == ticket.session_id && *generation == ticket.generation => {
                self.phase = SessionPhase::Hydrated {
                    session_id: ticket.session_id.clone(),
                    generation: ticket.generation,
                };
                true
            }
            _ => false,
        }
    }
}
