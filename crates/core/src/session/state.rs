//! Session state and change notifications

use authgear_domain::{SessionState, SessionStateChange, SessionStateChangeReason};
use tokio::sync::watch;
use tracing::info;

/// Current session state, observable through a `watch` channel
///
/// Every transition is delivered to subscribers in order; a slow subscriber
/// only ever sees the latest value.
pub struct SessionStateMachine {
    tx: watch::Sender<SessionStateChange>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionStateChange::default());
        Self { tx }
    }

    pub fn state(&self) -> SessionState {
        self.tx.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStateChange> {
        self.tx.subscribe()
    }

    /// Record a transition and notify subscribers.
    pub fn transition(&self, state: SessionState, reason: SessionStateChangeReason) {
        info!(?state, ?reason, "Session state changed");
        self.tx.send_replace(SessionStateChange { state, reason: Some(reason) });
    }

    /// Set the state without notifying, used after a silent refresh.
    pub fn set_quietly(&self, state: SessionState) {
        self.tx.send_if_modified(|current| {
            current.state = state;
            false
        });
    }
}
