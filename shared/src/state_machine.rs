//! Connection Session State Machine
//!
//! Defines the valid lifecycle of a single outbound serial-profile session.

/// Lifecycle state of a connection session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing attempted yet
    Idle,
    /// Connect in flight
    Connecting,
    /// Stream open, commands may be written
    Connected,
    /// The single connect attempt failed
    Failed,
    /// Released by the owner, or the peer hung up
    Closed,
}

impl SessionState {
    /// Commands may only be written while connected
    pub fn can_send(self) -> bool {
        self == SessionState::Connected
    }

    /// No further progress is possible from this state
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

/// Events that drive the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Caller asked to open the session
    OpenRequested,
    /// Socket connect returned a stream
    ConnectSucceeded,
    /// Socket connect returned an error
    ConnectFailed,
    /// Caller released the session
    CloseRequested,
    /// Remote end closed the stream
    PeerClosed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed, for repeated closes)
    Success(SessionState),
    /// Transition was invalid from current state
    Invalid {
        from: SessionState,
        event: SessionEvent,
    },
}

/// State machine for one connection session
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        match self.get_next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            (Idle, OpenRequested) => Some(Connecting),

            (Connecting, ConnectSucceeded) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Failed),

            (Connected, PeerClosed) => Some(Closed),

            // Close is valid from anywhere and idempotent
            (_, CloseRequested) => Some(Closed),

            _ => None,
        }
    }
}
