//! Session state machine.

use crate::types::{McpError, McpResult};

/// `Uninitialized → Negotiating → Active → Terminating → Closed`.
///
/// Any live state may jump to `Terminating` (disconnect, shutdown, corruption),
/// so a client that drops before finishing the handshake still goes through
/// teardown. `Closed` is only reachable from `Terminating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Negotiating,
    Active,
    Terminating,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, Negotiating)
                | (Negotiating, Active)
                | (Uninitialized | Negotiating | Active, Terminating)
                | (Terminating, Closed)
        )
    }

    /// Reject calls outside `Active` with the matching error kind.
    pub fn guard(self) -> McpResult<()> {
        match self {
            SessionState::Active => Ok(()),
            SessionState::Uninitialized | SessionState::Negotiating => {
                Err(McpError::NotInitialized)
            }
            SessionState::Terminating | SessionState::Closed => Err(McpError::SessionClosed),
        }
    }

    pub fn is_shutting_down(self) -> bool {
        matches!(self, SessionState::Terminating | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Negotiating => "negotiating",
            SessionState::Active => "active",
            SessionState::Terminating => "terminating",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    #[test]
    fn test_forward_path() {
        assert!(Uninitialized.can_transition_to(Negotiating));
        assert!(Negotiating.can_transition_to(Active));
        assert!(Active.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Closed));
    }

    #[test]
    fn test_disconnect_before_handshake_terminates() {
        assert!(Uninitialized.can_transition_to(Terminating));
        assert!(Negotiating.can_transition_to(Terminating));
        assert!(!Uninitialized.can_transition_to(Closed));
        assert!(!Negotiating.can_transition_to(Closed));
        assert!(!Active.can_transition_to(Closed));
    }

    #[test]
    fn test_no_way_back() {
        assert!(!Active.can_transition_to(Negotiating));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Closed.can_transition_to(Terminating));
        assert!(!Terminating.can_transition_to(Terminating));
        assert!(!Uninitialized.can_transition_to(Active));
    }

    #[test]
    fn test_guard_error_kinds() {
        assert!(Active.guard().is_ok());
        assert!(matches!(Uninitialized.guard(), Err(McpError::NotInitialized)));
        assert!(matches!(Negotiating.guard(), Err(McpError::NotInitialized)));
        assert!(matches!(Terminating.guard(), Err(McpError::SessionClosed)));
        assert!(matches!(Closed.guard(), Err(McpError::SessionClosed)));
    }
}
