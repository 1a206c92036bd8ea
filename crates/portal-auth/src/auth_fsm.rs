//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                  ┌───────────────────┐
//!     ┌──────────► │  Unauthenticated  │ (initial) ◄──────────────┐
//!     │            └─────────┬─────────┘                          │
//!     │                      │ LoginRequested / StoredSessionFound│
//!     │                      ▼                                    │
//!     │ LoginFailed  ┌───────────────────┐                        │
//!     └───────────── │  Authenticating   │                        │
//!                    └─────────┬─────────┘                        │
//!          LoginSucceeded /    │         SessionRejected          │
//!          SessionValidated    │     ┌─────────────────────┐      │
//!                              ▼     │                     ▼      │
//!                    ┌───────────────────┐  RefreshStarted ┌────────────┐
//!                    │   Authenticated   │ ──────────────► │ Refreshing │
//!                    └───────────────────┘ ◄────────────── └────────────┘
//!                                          RefreshSucceeded   RefreshFailed
//! ```
//!
//! `LogoutRequested` leads to `Unauthenticated` from every state, and
//! `SessionExpired` from every state that holds a session.

use portal_storage::User;
use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        LoginRequested => Authenticating,
        StoredSessionFound => Authenticating,
        LogoutRequested => Unauthenticated
    },
    Authenticating => {
        LoginSucceeded => Authenticated,
        LoginFailed => Unauthenticated,
        // Stored access token accepted by the authority
        SessionValidated => Authenticated,
        // Stored access token refused; one refresh is attempted
        SessionRejected => Refreshing,
        SessionExpired => Unauthenticated,
        LogoutRequested => Unauthenticated
    },
    Authenticated => {
        RefreshStarted => Refreshing,
        SessionExpired => Unauthenticated,
        LogoutRequested => Unauthenticated
    },
    Refreshing => {
        RefreshSucceeded => Authenticated,
        RefreshFailed => Unauthenticated,
        SessionExpired => Unauthenticated,
        LogoutRequested => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Public view of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl SessionState {
    /// Returns true if a usable session is held (Authenticated only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// Returns true while an operation is deciding the next stable state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticating | SessionState::Refreshing
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unauthenticated => SessionState::Unauthenticated,
            SessionMachineState::Authenticating => SessionState::Authenticating,
            SessionMachineState::Authenticated => SessionState::Authenticated,
            SessionMachineState::Refreshing => SessionState::Refreshing,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Unauthenticated => "UNAUTHENTICATED",
            SessionState::Authenticating => "AUTHENTICATING",
            SessionState::Authenticated => "AUTHENTICATED",
            SessionState::Refreshing => "REFRESHING",
        };
        f.write_str(label)
    }
}

/// What observers receive on every published change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// False until the startup check has finished.
    pub resolved: bool,
    /// The user, present only while a session is held.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Generation at the time of publishing.
    pub generation: u64,
}

impl SessionSnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            resolved: false,
            user: None,
            generation: 0,
        }
    }

    /// Whether a decision can be made from this snapshot.
    pub fn is_determinate(&self) -> bool {
        self.resolved && self.state != SessionState::Authenticating
    }
}
