//! Biometric-bound sign in
//!
//! Enabling registers a keypair that can only sign after the platform prompt
//! succeeded. Signing in later proves possession of that key.

use std::sync::Arc;

use authgear_domain::constants::CHALLENGE_PURPOSE_BIOMETRIC;
use authgear_domain::{
    AuthgearError, BiometricError, BiometricOptions, GrantType, JwtAction, Result,
    SessionStateChangeReason, TokenRequest, UserInfo,
};
use tracing::{debug, info};

use super::{Authgear, Inner};
use crate::interaction::BiometricPrompt;
use crate::keys::{KeyProtection, SignAuthorization};

/// Dismissing the prompt is a cancellation like any other.
fn prompt_error(err: AuthgearError) -> AuthgearError {
    if err.is_cancel() {
        AuthgearError::Cancelled
    } else {
        err
    }
}

impl Inner {
    fn biometric_prompt(&self) -> Result<&Arc<dyn BiometricPrompt>> {
        self.biometric.as_ref().ok_or(AuthgearError::Biometric(BiometricError::Unsupported))
    }
}

impl Authgear {
    /// # Errors
    /// `Biometric(..)` describing why biometrics cannot be used.
    pub async fn check_biometric_supported(&self, options: &BiometricOptions) -> Result<()> {
        self.inner.biometric_prompt()?.check_supported(options).await
    }

    /// Whether a biometric key id is stored for this namespace.
    ///
    /// # Errors
    /// Storage failures.
    pub async fn is_biometric_enabled(&self) -> Result<bool> {
        self.inner.require_configured()?;
        Ok(self.inner.biometric_keys.stored_kid().await?.is_some())
    }

    /// Remove the biometric key. Idempotent.
    ///
    /// # Errors
    /// Keystore and storage failures.
    pub async fn disable_biometric(&self) -> Result<()> {
        self.inner.require_configured()?;
        self.inner.biometric_keys.delete_key().await
    }

    /// Register a biometric key for the signed-in user.
    ///
    /// # Errors
    /// `Unauthenticated` without a session, `Cancelled` if the prompt was
    /// dismissed, other `Biometric(..)` prompt failures, protocol failures.
    pub async fn enable_biometric(&self, options: &BiometricOptions) -> Result<()> {
        let inner = &self.inner;
        let access_token = self.require_access_token().await?;
        let prompt = inner.biometric_prompt()?;
        prompt.check_supported(options).await?;

        let keys = &inner.biometric_keys;
        let previous = keys.stored_kid().await?;
        let protection = KeyProtection::UserAuthentication {
            invalidated_by_enrollment: options.invalidated_by_biometric_enrollment,
        };
        let key = keys.create_key(protection).await?;
        let alias = keys.purpose().alias(&key.kid);

        let setup = async {
            let challenge = inner.oauth.challenge(CHALLENGE_PURPOSE_BIOMETRIC).await?;
            prompt.authenticate(options).await.map_err(prompt_error)?;
            let jwt = inner
                .device_jwt(keys, &key, challenge.token, JwtAction::Setup, SignAuthorization::UserVerified)
                .await?;
            let request = TokenRequest {
                jwt: Some(jwt),
                access_token: Some(access_token),
                ..TokenRequest::new(GrantType::Biometric, &inner.config.client_id)
            };
            inner.oauth.biometric_setup(&request).await
        };
        if let Err(err) = setup.await {
            keys.keystore().delete_key_pair(&alias).await?;
            return Err(err);
        }

        keys.persist(&key.kid).await?;
        if let Some(previous) = previous.filter(|kid| *kid != key.kid) {
            keys.keystore().delete_key_pair(&keys.purpose().alias(&previous)).await?;
        }
        info!(kid = %key.kid, "Biometric enabled");
        Ok(())
    }

    /// Sign in with the registered biometric key.
    ///
    /// A rejected key, or one whose keypair is gone, disables biometrics.
    ///
    /// # Errors
    /// - `BiometricPrivateKeyNotFound` if biometrics are not enabled.
    /// - `Cancelled` if the prompt was dismissed; lockouts and other
    ///   prompt failures as `Biometric(..)`.
    /// - `OAuth` `invalid_grant` if the server no longer accepts the key.
    pub async fn authenticate_biometric(&self, options: &BiometricOptions) -> Result<UserInfo> {
        let inner = &self.inner;
        inner.require_configured()?;
        let keys = &inner.biometric_keys;
        let Some(key) = keys.existing_key().await? else {
            if keys.stored_kid().await?.is_some() {
                debug!("Biometric keypair lost, disabling");
                keys.delete_key().await?;
            }
            return Err(AuthgearError::BiometricPrivateKeyNotFound);
        };
        let prompt = inner.biometric_prompt()?;

        let challenge = inner.oauth.challenge(CHALLENGE_PURPOSE_BIOMETRIC).await?;
        prompt.authenticate(options).await.map_err(prompt_error)?;
        let jwt = inner
            .device_jwt(
                keys,
                &key,
                challenge.token,
                JwtAction::Authenticate,
                SignAuthorization::UserVerified,
            )
            .await?;
        let request = TokenRequest {
            jwt: Some(jwt),
            x_device_info: inner.device_info_param(),
            ..TokenRequest::new(GrantType::Biometric, &inner.config.client_id)
        };
        let tokens = match inner.oauth.exchange_token(&request).await {
            Ok(tokens) => tokens,
            Err(err) => {
                if err.is_invalid_grant() {
                    info!("Biometric key rejected, disabling");
                    keys.delete_key().await?;
                }
                return Err(err);
            }
        };
        inner.finish_with_tokens(&tokens, SessionStateChangeReason::Authorized).await
    }
}
