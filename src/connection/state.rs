//! Connection lifecycle state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or a previous start failed
    Initial,

    /// Pool opened, liveness check in progress
    Starting,

    /// Liveness check passed, pool usable
    Ready,

    /// Stopped
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, Starting)
                | (Starting, Ready)
                | (Starting, Initial)
                | (Initial, Closed)
                | (Starting, Closed)
                | (Ready, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::Starting).is_ok());
        assert!(state.transition(ConnectionState::Ready).is_ok());
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }

    #[test]
    fn test_failed_start_returns_to_initial() {
        let mut state = ConnectionState::Initial;
        state.transition(ConnectionState::Starting).unwrap();
        assert!(state.transition(ConnectionState::Initial).is_ok());
        assert!(state.transition(ConnectionState::Starting).is_ok());
    }

    #[test]
    fn test_cannot_skip_liveness_check() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::Ready).is_err());
    }

    #[test]
    fn test_double_start_rejected() {
        let mut state = ConnectionState::Ready;
        assert!(state.transition(ConnectionState::Starting).is_err());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = ConnectionState::Closed;
        assert!(state.transition(ConnectionState::Starting).is_err());
        assert!(state.transition(ConnectionState::Closed).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert_eq!(ConnectionState::Starting.to_string(), "starting");
    }
}
