//! Diff gate: decides when the effective preference value must be written.
//!
//! Gating is purely by canonical-serialization equality. Each issued write
//! carries a monotonically increasing token; only the latest token may advance
//! the last-persisted snapshot, so a slow earlier write can never regress it.

/// Identity of one issued write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTicket {
    pub token: u64,
    pub canonical: String,
    /// The write was issued because of the force flag, not a detected change.
    pub forced: bool,
}

#[derive(Debug, Default)]
pub struct DiffGate {
    last_persisted: Option<String>,
    force: bool,
    in_flight: Option<WriteTicket>,
    last_token: u64,
}

impl DiffGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything about the previous session. Tokens keep increasing.
    pub fn reset(&mut self) {
        self.last_persisted = None;
        self.force = false;
        self.in_flight = None;
    }

    /// Record the value a session was hydrated with.
    ///
    /// An empty server record leaves the snapshot empty and arms the force flag,
    /// so the first check writes even if the value equals the defaults.
    pub fn hydrated(&mut self, canonical: String, server_had_record: bool) {
        self.in_flight = None;
        if server_had_record {
            self.last_persisted = Some(canonical);
            self.force = false;
        } else {
            self.last_persisted = None;
            self.force = true;
        }
    }

    pub fn last_persisted(&self) -> Option<&str> {
        self.last_persisted.as_deref()
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    pub fn in_flight(&self) -> Option<&WriteTicket> {
        self.in_flight.as_ref()
    }

    /// Issue a write ticket if `canonical` must be persisted.
    pub fn check(&mut self, canonical: &str) -> Option<WriteTicket> {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|t| t.canonical == canonical)
        {
            return None;
        }
        if !self.force && self.last_persisted.as_deref() == Some(canonical) {
            return None;
        }

        self.last_token += 1;
        let ticket = WriteTicket {
            token: self.last_token,
            canonical: canonical.to_string(),
            forced: self.force,
        };
        self.force = false;
        self.in_flight = Some(ticket.clone());
        Some(ticket)
    }

    pub fn is_latest(&self, token: u64) -> bool {
        token == self.last_token
    }

    /// Mark a write successful. Returns `false` if a newer write superseded it.
    pub fn succeeded(&mut self, ticket: &WriteTicket) -> bool {
        if !self.is_latest(ticket.token) {
            return false;
        }
        self.last_persisted = Some(ticket.canonical.clone());
        self.in_flight = None;
        true
    }

    /// Mark a write failed. The snapshot stays stale so the next check retries.
    pub fn failed(&mut self, ticket: &WriteTicket) -> bool {
        if !self.is_latest(ticket.token) {
            return false;
        }
        self.in_flight = None;
        if ticket.forced {
            self.force = true;
        }
        true
    }

    /// Adopt the server's canonical representation after a read-back.
    pub fn confirmed(&mut self, canonical: String) {
        self.last_persisted = Some(canonical);
    }
}
