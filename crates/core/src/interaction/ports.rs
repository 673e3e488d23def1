//! Port interfaces for platform user interaction

use async_trait::async_trait;
use authgear_domain::{BiometricOptions, Result};
use url::Url;

/// Presents authorization pages (browser, custom tab, WebView)
#[async_trait]
pub trait UiPresenter: Send + Sync {
    /// Open `url` and resolve with the first navigation to `redirect_uri`.
    ///
    /// Dismissal by the user resolves with `AuthgearError::Cancelled`.
    async fn open_authorization_url(&self, url: &Url, redirect_uri: &str) -> Result<Url>;

    /// Open `url` without waiting for a result.
    async fn open_url(&self, url: &Url) -> Result<()>;
}

/// The platform biometric prompt
#[async_trait]
pub trait BiometricPrompt: Send + Sync {
    /// Whether biometric authentication can be used with these options.
    ///
    /// # Errors
    /// `AuthgearError::Biometric` with the reason it cannot.
    async fn check_supported(&self, options: &BiometricOptions) -> Result<()>;

    /// Show the prompt. Success authorizes one signing operation with a
    /// user-authenticated key.
    async fn authenticate(&self, options: &BiometricOptions) -> Result<()>;
}
