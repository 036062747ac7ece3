//! Server lifecycle states.

/// Operational state of the ledger service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Store is opening.
    Starting,
    /// Accepting requests.
    Running,
    /// Draining in-flight requests, refusing new ones.
    ShuttingDown,
    /// Store closed.
    Stopped,
}

impl ServiceState {
    /// Check if new requests are accepted.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ServiceState::Running)
    }

    /// Check if the service is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped)
    }
}
