//! Authorization code flows
//!
//! Sign in, reauthentication, settings actions, pre-authenticated URLs,
//! authenticated web pages and the WeChat callback.

use authgear_domain::constants::{
    CLAIM_SCOPE, LOGIN_HINT_BASE, PRE_AUTHENTICATED_URL_SCOPE, RESPONSE_TYPE_NONE,
    RESPONSE_TYPE_PRE_AUTHENTICATED_URL, RESPONSE_TYPE_SETTINGS_ACTION, SETTINGS_ACTION_SCOPES,
};
use authgear_domain::{
    AuthenticateOptions, AuthenticateResult, AuthgearError, BiometricOptions, GrantType,
    PreAuthenticatedUrlOptions, PromptOption, ReauthenticateOptions, Result,
    SessionStateChangeReason, SettingsAction, SettingsActionOptions, TokenRequest, TokenType,
};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::Authgear;
use crate::oauth::{login_hint, parse_redirect, AuthorizationRequest};
use crate::storage::StorageKey;

/// A prepared authorization, for callers that present the page themselves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    pub url: Url,
    pub redirect_uri: String,
    pub state: Option<String>,
}

fn full_access_scopes() -> Vec<String> {
    SETTINGS_ACTION_SCOPES.iter().map(ToString::to_string).collect()
}

impl Authgear {
    /// Sign in with the authorization code flow.
    ///
    /// # Errors
    /// `Cancelled` if the user dismissed the page, `OAuth` for an error
    /// redirect, otherwise protocol and storage failures.
    pub async fn authenticate(&self, options: AuthenticateOptions) -> Result<AuthenticateResult> {
        let request = self.create_authentication_request(options).await?;
        let redirect = match self
            .inner
            .presenter
            .open_authorization_url(&request.url, &request.redirect_uri)
            .await
        {
            Ok(redirect) => redirect,
            Err(err) => {
                self.inner.storage.delete(StorageKey::Verifier).await?;
                return Err(err);
            }
        };
        self.inner.handle_wechat_redirect(&redirect);
        self.finish_authentication(&request, &redirect).await
    }

    /// Prepare an authorization URL without presenting it.
    ///
    /// The PKCE verifier is persisted for [`Authgear::finish_authentication`].
    ///
    /// # Errors
    /// `NotConfigured`, discovery and storage failures.
    pub async fn create_authentication_request(
        &self,
        options: AuthenticateOptions,
    ) -> Result<AuthenticationRequest> {
        let inner = &self.inner;
        inner.require_configured()?;
        let mut request = inner.authorization_request(&options.redirect_uri);
        request.state = options.state.clone();
        request.x_state = options.x_state;
        request.prompt = options.prompt;
        request.login_hint = options.login_hint;
        request.ui_locales = options.ui_locales.or(request.ui_locales);
        request.color_scheme = options.color_scheme.or(request.color_scheme);
        request.wechat_redirect_uri = options.wechat_redirect_uri;
        request.page = options.page.map(|page| page.as_str().to_string());
        request.authentication_flow_group = options.authentication_flow_group;
        request.response_mode = options.response_mode;

        let url = inner.prepare_code_request(request).await?;
        Ok(AuthenticationRequest { url, redirect_uri: options.redirect_uri, state: options.state })
    }

    /// Complete a request from [`Authgear::create_authentication_request`]
    /// with the redirect the page returned.
    ///
    /// # Errors
    /// `Cancelled`, `OAuth` for an error redirect, protocol failures.
    pub async fn finish_authentication(
        &self,
        request: &AuthenticationRequest,
        redirect: &Url,
    ) -> Result<AuthenticateResult> {
        let inner = &self.inner;
        let response = match parse_redirect(redirect) {
            Ok(response) => response,
            Err(err) => {
                inner.storage.delete(StorageKey::Verifier).await?;
                return Err(err);
            }
        };
        let tokens = inner
            .exchange_code(GrantType::AuthorizationCode, &response, &request.redirect_uri, None)
            .await?;
        let user_info =
            inner.finish_with_tokens(&tokens, SessionStateChangeReason::Authorized).await?;
        Ok(AuthenticateResult { user_info, state: response.state.or_else(|| request.state.clone()) })
    }

    /// Confirm the signed-in user's identity again.
    ///
    /// With `biometric` options and biometrics enabled, the biometric flow is
    /// used and no page is shown.
    ///
    /// # Errors
    /// `Unauthenticated` without an id token, otherwise the failures of the
    /// chosen flow.
    pub async fn reauthenticate(
        &self,
        options: ReauthenticateOptions,
        biometric: Option<&BiometricOptions>,
    ) -> Result<AuthenticateResult> {
        let inner = &self.inner;
        inner.require_configured()?;
        if let Some(biometric) = biometric {
            if self.is_biometric_enabled().await? {
                let user_info = self.authenticate_biometric(biometric).await?;
                return Ok(AuthenticateResult { user_info, state: options.state });
            }
        }

        let id_token = self.id_token().ok_or(AuthgearError::Unauthenticated)?;
        let mut request = inner.authorization_request(&options.redirect_uri);
        request.scope = full_access_scopes();
        request.id_token_hint = Some(id_token);
        request.max_age = Some(options.max_age.unwrap_or(0));
        request.state = options.state.clone();
        request.x_state = options.x_state;
        request.ui_locales = options.ui_locales.or(request.ui_locales);
        request.color_scheme = options.color_scheme.or(request.color_scheme);
        request.wechat_redirect_uri = options.wechat_redirect_uri;
        request.authentication_flow_group = options.authentication_flow_group;

        let (response, tokens) =
            inner.run_code_flow(request, GrantType::AuthorizationCode, None).await?;
        let user_info =
            inner.finish_with_tokens(&tokens, SessionStateChangeReason::Authorized).await?;
        Ok(AuthenticateResult { user_info, state: response.state.or(options.state) })
    }

    /// Run a settings action such as changing the password.
    ///
    /// The session itself is not changed.
    ///
    /// # Errors
    /// `Unauthenticated` without a session, `Cancelled`, `OAuth`, protocol
    /// failures.
    pub async fn settings_action(
        &self,
        action: SettingsAction,
        options: SettingsActionOptions,
    ) -> Result<()> {
        let inner = &self.inner;
        inner.require_configured()?;
        let id_token = self.id_token().ok_or(AuthgearError::Unauthenticated)?;
        let hint = self.app_session_login_hint().await?;

        let mut request = inner.authorization_request(&options.redirect_uri);
        request.response_type = RESPONSE_TYPE_SETTINGS_ACTION.to_string();
        request.scope = full_access_scopes();
        request.is_sso_enabled = false;
        request.prompt = Some(vec![PromptOption::None]);
        request.login_hint = Some(hint);
        request.id_token_hint = Some(id_token);
        request.settings_action = Some(action);
        request.ui_locales = options.ui_locales.or(request.ui_locales);
        request.color_scheme = options.color_scheme.or(request.color_scheme);
        request.wechat_redirect_uri = options.wechat_redirect_uri;

        let access_token = self.require_access_token().await?;
        inner.run_code_flow(request, GrantType::SettingsAction, Some(access_token)).await?;
        debug!(action = action.as_str(), "Settings action finished");
        Ok(())
    }

    /// URL that opens `redirect_uri` on the Authgear origin already signed in.
    ///
    /// # Errors
    /// `Unauthenticated` without a session, protocol failures.
    pub async fn generate_url(&self, redirect_uri: &str) -> Result<Url> {
        let inner = &self.inner;
        inner.require_configured()?;
        let hint = self.app_session_login_hint().await?;
        let mut request = inner.authorization_request(redirect_uri);
        request.response_type = RESPONSE_TYPE_NONE.to_string();
        request.prompt = Some(vec![PromptOption::None]);
        request.login_hint = Some(hint);
        inner.authorization_url(request).await
    }

    /// Open `path` on the Authgear endpoint, signed in.
    ///
    /// # Errors
    /// `InvalidInput` if `path` does not resolve against the endpoint,
    /// otherwise the failures of [`Authgear::generate_url`].
    pub async fn open_url(&self, path: &str) -> Result<()> {
        let target = self
            .inner
            .config
            .endpoint_url()?
            .join(path)
            .map_err(|e| AuthgearError::InvalidInput(format!("invalid path {path}: {e}")))?;
        let url = self.generate_url(target.as_str()).await?;
        self.inner.presenter.open_url(&url).await
    }

    /// URL that lets the web app `options.client_id` adopt this session.
    ///
    /// # Errors
    /// - `PreAuthenticatedUrlIdTokenNotFound` without an id token.
    /// - `PreAuthenticatedUrlInsufficientScope` when the id token lacks the
    ///   pre-authenticated URL scope.
    /// - `PreAuthenticatedUrlDeviceSecretNotFound` without a device secret.
    pub async fn make_pre_authenticated_url(
        &self,
        options: PreAuthenticatedUrlOptions,
    ) -> Result<Url> {
        let inner = &self.inner;
        inner.require_configured()?;
        self.refresh_access_token_if_needed().await?;

        let id_token = self.id_token().ok_or(AuthgearError::PreAuthenticatedUrlIdTokenNotFound)?;
        let has_scope = self.id_token_claims()?.is_some_and(|claims| {
            claims
                .get(CLAIM_SCOPE)
                .and_then(Value::as_str)
                .is_some_and(|scope| scope.split(' ').any(|s| s == PRE_AUTHENTICATED_URL_SCOPE))
        });
        if !has_scope {
            return Err(AuthgearError::PreAuthenticatedUrlInsufficientScope);
        }
        let device_secret = inner
            .storage
            .get(StorageKey::DeviceSecret)
            .await?
            .ok_or(AuthgearError::PreAuthenticatedUrlDeviceSecretNotFound)?;

        let exchange = TokenRequest {
            requested_token_type: Some(TokenType::PreAuthenticatedUrlToken),
            audience: Some(inner.config.endpoint_origin()?),
            subject_token_type: Some(TokenType::IdToken),
            subject_token: Some(id_token.clone()),
            actor_token_type: Some(TokenType::DeviceSecret),
            actor_token: Some(device_secret),
            ..TokenRequest::new(GrantType::TokenExchange, &inner.config.client_id)
        };
        let response = inner.oauth.exchange_token(&exchange).await?;
        let token = response.access_token.clone().ok_or_else(|| {
            AuthgearError::UnexpectedResponse {
                status: 200,
                body: "token exchange carries no access_token".to_string(),
            }
        })?;
        if let Some(device_secret) = &response.device_secret {
            inner.storage.set(StorageKey::DeviceSecret, device_secret).await?;
        }
        let id_token = match response.id_token {
            Some(new_id_token) => {
                inner.storage.set(StorageKey::IdToken, &new_id_token).await?;
                inner.tokens.write().id_token = Some(new_id_token.clone());
                new_id_token
            }
            None => id_token,
        };

        let mut request =
            AuthorizationRequest::code(&options.redirect_uri, inner.config.platform.as_str());
        request.response_type = RESPONSE_TYPE_PRE_AUTHENTICATED_URL.to_string();
        request.scope = Vec::new();
        request.prompt = Some(vec![PromptOption::None]);
        request.id_token_hint = Some(id_token);
        request.pre_authenticated_url_token = Some(token);
        request.state = options.state;
        request.is_sso_enabled = inner.config.is_sso_enabled;
        let configuration = inner.oauth.discover().await?;
        request.to_url(&configuration.authorization_endpoint, &options.client_id)
    }

    /// Report the result of a WeChat login started from a
    /// [`super::WechatAuthRequest`].
    ///
    /// # Errors
    /// Protocol failures.
    pub async fn wechat_auth_callback(&self, code: &str, state: &str) -> Result<()> {
        self.inner.require_configured()?;
        self.inner.oauth.wechat_callback(code, state).await
    }

    /// `login_hint` carrying a fresh app session token.
    async fn app_session_login_hint(&self) -> Result<String> {
        self.require_access_token().await?;
        let refresh_token = self
            .inner
            .tokens
            .read()
            .refresh_token
            .clone()
            .ok_or(AuthgearError::Unauthenticated)?;
        let token = self.inner.oauth.app_session_token(&refresh_token).await?.app_session_token;
        login_hint(LOGIN_HINT_BASE, &[("type", "app_session_token"), ("app_session_token", &token)])
    }
}
