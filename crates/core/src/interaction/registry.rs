//! Correlation of in-flight authorizations with their redirects
//!
//! Platform code receives [`PendingInteraction`]s, shows the page, and later
//! reports the redirect (or dismissal) by correlation token. Each token
//! resolves exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use authgear_domain::{AuthgearError, Result};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use url::Url;

use super::ports::UiPresenter;
use crate::pkce::generate_state;

/// An authorization page waiting to be shown or completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInteraction {
    /// Correlation token for [`InteractionRegistry::complete`].
    pub token: String,
    pub url: Url,
    /// `None` for fire-and-forget pages, which have no token registered.
    pub redirect_uri: Option<String>,
}

/// Map of correlation token to the waiting flow
#[derive(Default)]
pub struct InteractionRegistry {
    pending: Mutex<HashMap<String, oneshot::Sender<Result<Url>>>>,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new interaction.
    pub fn begin(&self) -> (String, oneshot::Receiver<Result<Url>>) {
        let token = generate_state();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(token.clone(), tx);
        (token, rx)
    }

    /// Resolve with the redirect URL.
    ///
    /// # Errors
    /// `AuthgearError::InteractionNotFound` for an unknown or already
    /// resolved token.
    pub fn complete(&self, token: &str, redirect: Url) -> Result<()> {
        self.resolve(token, Ok(redirect))
    }

    /// Resolve as dismissed by the user.
    ///
    /// # Errors
    /// `AuthgearError::InteractionNotFound` for an unknown or already
    /// resolved token.
    pub fn cancel(&self, token: &str) -> Result<()> {
        self.resolve(token, Err(AuthgearError::Cancelled))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn resolve(&self, token: &str, outcome: Result<Url>) -> Result<()> {
        let sender = self
            .pending
            .lock()
            .remove(token)
            .ok_or_else(|| AuthgearError::InteractionNotFound(token.to_string()))?;
        // The waiting flow may already be gone.
        let _ = sender.send(outcome);
        Ok(())
    }

    fn forget(&self, token: &str) {
        self.pending.lock().remove(token);
    }
}

/// [`UiPresenter`] that hands pages to platform code over a channel
pub struct ChannelPresenter {
    registry: Arc<InteractionRegistry>,
    outbox: mpsc::UnboundedSender<PendingInteraction>,
}

impl ChannelPresenter {
    /// The receiver is what platform code listens on.
    pub fn new(
        registry: Arc<InteractionRegistry>,
    ) -> (Self, mpsc::UnboundedReceiver<PendingInteraction>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (Self { registry, outbox }, inbox)
    }

    pub fn registry(&self) -> &Arc<InteractionRegistry> {
        &self.registry
    }

    fn publish(&self, interaction: PendingInteraction) -> Result<()> {
        self.outbox
            .send(interaction)
            .map_err(|_| AuthgearError::Internal("interaction receiver dropped".to_string()))
    }
}

#[async_trait]
impl UiPresenter for ChannelPresenter {
    async fn open_authorization_url(&self, url: &Url, redirect_uri: &str) -> Result<Url> {
        let (token, rx) = self.registry.begin();
        debug!(token_len = token.len(), "Publishing pending interaction");
        if let Err(err) = self.publish(PendingInteraction {
            token: token.clone(),
            url: url.clone(),
            redirect_uri: Some(redirect_uri.to_string()),
        }) {
            self.registry.forget(&token);
            return Err(err);
        }
        // Sender dropped without resolving.
        rx.await.unwrap_or(Err(AuthgearError::Cancelled))
    }

    async fn open_url(&self, url: &Url) -> Result<()> {
        self.publish(PendingInteraction {
            token: generate_state(),
            url: url.clone(),
            redirect_uri: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `InteractionRegistry` behavior for the exactly-once
    /// resolution scenario.
    ///
    /// Assertions:
    /// - Confirms the waiting receiver gets the redirect.
    /// - Ensures a second completion of the same token is rejected.
    /// - Ensures an unknown token is rejected.
    #[tokio::test]
    async fn test_complete_resolves_once() {
        let registry = InteractionRegistry::new();
        let (token, rx) = registry.begin();
        let redirect = Url::parse("com.example://cb?code=abc").unwrap();

        registry.complete(&token, redirect.clone()).unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), redirect);

        assert!(matches!(
            registry.complete(&token, redirect.clone()),
            Err(AuthgearError::InteractionNotFound(_))
        ));
        assert!(matches!(registry.cancel("nope"), Err(AuthgearError::InteractionNotFound(_))));
        assert_eq!(registry.pending_count(), 0);
    }

    /// Validates `ChannelPresenter::open_authorization_url` behavior for the
    /// platform round trip scenario.
    ///
    /// Assertions:
    /// - Confirms the page is published with its redirect URI.
    /// - Confirms completion by token resolves the presenter call.
    /// - Ensures cancellation maps to `Cancelled`.
    #[tokio::test]
    async fn test_channel_presenter_round_trip() {
        let registry = Arc::new(InteractionRegistry::new());
        let (presenter, mut inbox) = ChannelPresenter::new(registry.clone());
        let url = Url::parse("https://e.example/oauth2/authorize?client_id=c").unwrap();

        let platform = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let first = inbox.recv().await.unwrap();
                assert_eq!(first.redirect_uri.as_deref(), Some("com.example://cb"));
                registry
                    .complete(&first.token, Url::parse("com.example://cb?code=abc").unwrap())
                    .unwrap();
                let second = inbox.recv().await.unwrap();
                registry.cancel(&second.token).unwrap();
            })
        };

        let redirect = presenter.open_authorization_url(&url, "com.example://cb").await.unwrap();
        assert_eq!(redirect.query(), Some("code=abc"));

        let cancelled = presenter.open_authorization_url(&url, "com.example://cb").await;
        assert!(matches!(cancelled, Err(AuthgearError::Cancelled)));
        platform.await.unwrap();
    }
}
