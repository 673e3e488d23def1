//! Session state and the reasons attached to each transition

use serde::{Deserialize, Serialize};

/// Current session state of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Before the first successful `configure`.
    #[default]
    Unknown,
    NoSession,
    LoggedIn,
}

/// Why the session state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStateChangeReason {
    /// Configured with no persisted refresh token.
    NoToken,
    /// Configured with a persisted refresh token.
    FoundToken,
    /// A flow completed and issued new tokens.
    Authorized,
    /// Explicit logout.
    Logout,
    /// The refresh token was rejected by the server.
    Expired,
    /// Local state was cleared without contacting the server.
    Clear,
}

/// One state transition notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStateChange {
    pub state: SessionState,
    /// `None` only for the initial `Unknown` value.
    pub reason: Option<SessionStateChangeReason>,
}

impl Default for SessionStateChange {
    fn default() -> Self {
        Self { state: SessionState::Unknown, reason: None }
    }
}
