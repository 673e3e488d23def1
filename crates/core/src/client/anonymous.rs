//! Anonymous users and their promotion to regular users

use authgear_domain::constants::{CHALLENGE_PURPOSE_ANONYMOUS, LOGIN_HINT_BASE};
use authgear_domain::{
    AuthenticateResult, AuthgearError, GrantType, JwtAction, PromoteOptions, PromptOption, Result,
    SessionStateChangeReason, TokenRequest, UserInfo,
};
use tracing::debug;

use super::Authgear;
use crate::keys::{KeyProtection, SignAuthorization};
use crate::oauth::login_hint;

impl Authgear {
    /// Sign in as the anonymous user bound to this device, creating it on
    /// first use.
    ///
    /// A new key id is persisted only after the server issued tokens for it.
    ///
    /// # Errors
    /// `NotConfigured`, protocol, keystore and storage failures.
    pub async fn authenticate_anonymously(&self) -> Result<UserInfo> {
        let inner = &self.inner;
        inner.require_configured()?;
        let challenge = inner.oauth.challenge(CHALLENGE_PURPOSE_ANONYMOUS).await?;
        let keys = &inner.anonymous_keys;
        let (key, is_new) = keys.prepare_key(KeyProtection::Unprotected).await?;
        let jwt = inner
            .device_jwt(keys, &key, challenge.token, JwtAction::Auth, SignAuthorization::Unattended)
            .await?;

        let request = TokenRequest {
            jwt: Some(jwt),
            x_device_info: inner.device_info_param(),
            ..TokenRequest::new(GrantType::Anonymous, &inner.config.client_id)
        };
        let tokens = match inner.oauth.exchange_token(&request).await {
            Ok(tokens) => tokens,
            Err(err) => {
                if is_new {
                    keys.keystore().delete_key_pair(&keys.purpose().alias(&key.kid)).await?;
                }
                return Err(err);
            }
        };
        let user_info =
            inner.finish_with_tokens(&tokens, SessionStateChangeReason::Authorized).await?;
        if is_new {
            keys.persist(&key.kid).await?;
            debug!(kid = %key.kid, "Anonymous user created");
        }
        Ok(user_info)
    }

    /// Turn the anonymous user into a regular one through the sign up page.
    ///
    /// # Errors
    /// `AnonymousUserNotFound` without an anonymous key, otherwise the
    /// failures of the code flow.
    pub async fn promote_anonymous_user(
        &self,
        options: PromoteOptions,
    ) -> Result<AuthenticateResult> {
        let inner = &self.inner;
        inner.require_configured()?;
        let keys = &inner.anonymous_keys;
        let key = keys.existing_key().await?.ok_or(AuthgearError::AnonymousUserNotFound)?;
        let challenge = inner.oauth.challenge(CHALLENGE_PURPOSE_ANONYMOUS).await?;
        let jwt = inner
            .device_jwt(keys, &key, challenge.token, JwtAction::Promote, SignAuthorization::Unattended)
            .await?;

        let mut request = inner.authorization_request(&options.redirect_uri);
        request.prompt = Some(vec![PromptOption::Login]);
        request.login_hint = Some(login_hint(LOGIN_HINT_BASE, &[("type", "anonymous"), ("jwt", &jwt)])?);
        request.state = options.state.clone();
        request.x_state = options.x_state;
        request.ui_locales = options.ui_locales.or(request.ui_locales);
        request.color_scheme = options.color_scheme.or(request.color_scheme);
        request.wechat_redirect_uri = options.wechat_redirect_uri;

        let (response, tokens) =
            inner.run_code_flow(request, GrantType::AuthorizationCode, None).await?;
        let user_info =
            inner.finish_with_tokens(&tokens, SessionStateChangeReason::Authorized).await?;
        keys.delete_key().await?;
        Ok(AuthenticateResult { user_info, state: response.state.or(options.state) })
    }
}
