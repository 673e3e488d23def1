//! The Authgear container
//!
//! One [`Authgear`] per namespace owns the session state and drives every
//! authentication flow. Flows are split across submodules:
//! - `code_flow`: authorization code + PKCE, reauthentication, settings
//!   actions, pre-authenticated URLs and WeChat
//! - `anonymous`: anonymous users and their promotion
//! - `biometric`: biometric-bound sign in
//! - `app2app`: authorization between two apps on the same device
//!
//! All operations are safe to call concurrently. Access token refresh is
//! single-flight per container.

mod anonymous;
mod app2app;
mod biometric;
mod code_flow;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use authgear_domain::constants::{
    ACCESS_TOKEN_SKEW_SECONDS, CHALLENGE_PURPOSE_APP2APP, CLAIM_AUTH_TIME,
    CLAIM_CAN_REAUTHENTICATE,
};
use authgear_domain::{
    AuthgearConfig, AuthgearError, GrantType, JwtAction, JwtPayload, Result, SessionState,
    SessionStateChange, SessionStateChangeReason, TokenRequest, TokenResponse, UserInfo,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use url::Url;

pub use code_flow::AuthenticationRequest;

use crate::interaction::{BiometricPrompt, UiPresenter};
use crate::jwt::{self, decode_payload};
use crate::keys::{
    App2AppKeyManager, DPoPKeyManager, DPoPProvider, DeviceKey, DeviceKeyManager, KeyPurpose,
    KeyStore, SignAuthorization,
};
use crate::oauth::{parse_redirect, AuthorizationRequest, AuthorizationResponse, OAuthProvider};
use crate::pkce::PkceChallenge;
use crate::session::{SessionStateMachine, SingleFlight};
use crate::storage::{SessionStorage, StorageKey};

/// Options for [`Authgear::configure_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigureOptions {
    /// Refresh the access token right away when a session was found.
    pub refresh_access_token: bool,
}

/// Raised when the authorization UI navigates to the WeChat redirect URI.
///
/// The app should start WeChat login and report the result with
/// [`Authgear::wechat_auth_callback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WechatAuthRequest {
    pub state: String,
}

/// In-memory tokens of the current session.
///
/// `generation` changes whenever a session starts or ends, so a refresh that
/// began in an earlier session can tell its result is stale.
#[derive(Default)]
struct TokenState {
    access_token: Option<String>,
    expire_at: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    generation: u64,
}

impl TokenState {
    fn next(&self, refresh_token: Option<String>, id_token: Option<String>) -> Self {
        Self {
            refresh_token,
            id_token,
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        }
    }

    fn apply(&mut self, response: &TokenResponse) {
        if let Some(access_token) = &response.access_token {
            self.access_token = Some(access_token.clone());
            self.expire_at = response
                .expires_in
                .and_then(TimeDelta::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        }
        if let Some(refresh_token) = &response.refresh_token {
            self.refresh_token = Some(refresh_token.clone());
        }
        if let Some(id_token) = &response.id_token {
            self.id_token = Some(id_token.clone());
        }
    }
}

/// Builder for [`Authgear`]
pub struct AuthgearBuilder {
    config: AuthgearConfig,
    oauth: Option<Arc<dyn OAuthProvider>>,
    keystore: Option<Arc<dyn KeyStore>>,
    storage: Option<SessionStorage>,
    presenter: Option<Arc<dyn UiPresenter>>,
    biometric: Option<Arc<dyn BiometricPrompt>>,
    dpop: Option<Arc<DPoPKeyManager>>,
}

impl AuthgearBuilder {
    pub fn with_oauth(mut self, oauth: Arc<dyn OAuthProvider>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn with_keystore(mut self, keystore: Arc<dyn KeyStore>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    /// Storage for this container's namespace.
    pub fn with_storage(mut self, storage: SessionStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn UiPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn with_biometric_prompt(mut self, biometric: Arc<dyn BiometricPrompt>) -> Self {
        self.biometric = Some(biometric);
        self
    }

    /// The DPoP key shared with the protocol client. Ignored unless
    /// `dpop_enabled` is set in the configuration.
    pub fn with_dpop(mut self, dpop: Arc<DPoPKeyManager>) -> Self {
        self.dpop = Some(dpop);
        self
    }

    /// # Errors
    /// Returns `AuthgearError::Config` if the configuration is invalid or a
    /// required port is missing.
    pub fn build(self) -> Result<Authgear> {
        self.config.validate()?;
        let missing = |name: &str| AuthgearError::Config(format!("{name} is required"));
        let oauth = self.oauth.ok_or_else(|| missing("oauth provider"))?;
        let keystore = self.keystore.ok_or_else(|| missing("keystore"))?;
        let storage = self.storage.ok_or_else(|| missing("storage"))?;
        let presenter = self.presenter.ok_or_else(|| missing("presenter"))?;
        if storage.namespace() != self.config.name {
            return Err(AuthgearError::Config(format!(
                "storage namespace {} does not match container name {}",
                storage.namespace(),
                self.config.name
            )));
        }

        let dpop = if self.config.dpop_enabled { self.dpop } else { None };
        let app2app = App2AppKeyManager::new(Arc::clone(&keystore), storage.clone())
            .with_device_info(self.config.device_info.clone());
        let anonymous_keys =
            DeviceKeyManager::new(KeyPurpose::Anonymous, Arc::clone(&keystore), storage.clone());
        let biometric_keys =
            DeviceKeyManager::new(KeyPurpose::Biometric, Arc::clone(&keystore), storage.clone());
        let (wechat, _) = broadcast::channel(16);

        Ok(Authgear {
            inner: Arc::new(Inner {
                config: self.config,
                oauth,
                storage,
                presenter,
                biometric: self.biometric,
                dpop,
                app2app,
                anonymous_keys,
                biometric_keys,
                session: SessionStateMachine::new(),
                tokens: RwLock::new(TokenState::default()),
                refresh: SingleFlight::new(),
                configured: AtomicBool::new(false),
                wechat,
            }),
        })
    }
}

/// Authgear client container for one namespace
#[derive(Clone)]
pub struct Authgear {
    inner: Arc<Inner>,
}

struct Inner {
    config: AuthgearConfig,
    oauth: Arc<dyn OAuthProvider>,
    storage: SessionStorage,
    presenter: Arc<dyn UiPresenter>,
    biometric: Option<Arc<dyn BiometricPrompt>>,
    dpop: Option<Arc<DPoPKeyManager>>,
    app2app: App2AppKeyManager,
    anonymous_keys: DeviceKeyManager,
    biometric_keys: DeviceKeyManager,
    session: SessionStateMachine,
    tokens: RwLock<TokenState>,
    refresh: SingleFlight<Option<String>>,
    configured: AtomicBool,
    wechat: broadcast::Sender<WechatAuthRequest>,
}

impl Authgear {
    pub fn builder(config: AuthgearConfig) -> AuthgearBuilder {
        AuthgearBuilder {
            config,
            oauth: None,
            keystore: None,
            storage: None,
            presenter: None,
            biometric: None,
            dpop: None,
        }
    }

    pub fn config(&self) -> &AuthgearConfig {
        &self.inner.config
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Session state changes, starting from the current value.
    pub fn subscribe(&self) -> watch::Receiver<SessionStateChange> {
        self.inner.session.subscribe()
    }

    /// WeChat login requests raised during authorization.
    pub fn wechat_requests(&self) -> broadcast::Receiver<WechatAuthRequest> {
        self.inner.wechat.subscribe()
    }

    /// The cached access token, if any. Does not refresh.
    pub fn access_token(&self) -> Option<String> {
        self.inner.tokens.read().access_token.clone()
    }

    pub fn id_token(&self) -> Option<String> {
        self.inner.tokens.read().id_token.clone()
    }

    /// Claims of the current id token.
    ///
    /// # Errors
    /// `AuthgearError::MalformedJwt` if the stored id token cannot be decoded.
    pub fn id_token_claims(&self) -> Result<Option<Map<String, Value>>> {
        self.id_token().as_deref().map(decode_payload).transpose()
    }

    /// When the user last authenticated, from the id token.
    pub fn auth_time(&self) -> Option<DateTime<Utc>> {
        let claims = self.id_token_claims().ok()??;
        DateTime::from_timestamp(claims.get(CLAIM_AUTH_TIME)?.as_i64()?, 0)
    }

    /// Whether the user has a way to reauthenticate.
    pub fn can_reauthenticate(&self) -> bool {
        self.id_token_claims()
            .ok()
            .flatten()
            .and_then(|claims| claims.get(CLAIM_CAN_REAUTHENTICATE).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    /// Load persisted state without refreshing.
    ///
    /// # Errors
    /// Propagates storage failures that corruption recovery could not heal.
    pub async fn configure(&self) -> Result<()> {
        self.configure_with(ConfigureOptions::default()).await
    }

    /// Load persisted state and emit `NoToken` or `FoundToken`.
    ///
    /// # Errors
    /// Propagates storage failures, and refresh failures other than a
    /// rejected refresh token when `refresh_access_token` is set.
    pub async fn configure_with(&self, options: ConfigureOptions) -> Result<()> {
        let inner = &self.inner;
        let refresh_token = inner.storage.get(StorageKey::RefreshToken).await?;
        let id_token = inner.storage.get(StorageKey::IdToken).await?;
        let found = refresh_token.is_some();
        {
            let mut tokens = inner.tokens.write();
            *tokens = tokens.next(refresh_token, id_token);
        }
        inner.configured.store(true, Ordering::SeqCst);

        if found {
            inner.session.transition(SessionState::LoggedIn, SessionStateChangeReason::FoundToken);
        } else {
            inner.session.transition(SessionState::NoSession, SessionStateChangeReason::NoToken);
        }

        if found && options.refresh_access_token {
            match self.refresh_access_token().await {
                Err(err) if !err.is_invalid_grant() => return Err(err),
                _ => {}
            }
        }
        Ok(())
    }

    /// A valid access token, refreshing it if needed.
    ///
    /// Returns `None` without network traffic when there is no session.
    /// Concurrent callers share one refresh.
    ///
    /// # Errors
    /// Propagates the refresh failure. A rejected refresh token also clears
    /// the session with reason `Expired`.
    pub async fn refresh_access_token_if_needed(&self) -> Result<Option<String>> {
        self.inner.require_configured()?;
        if let Some(token) = self.inner.valid_access_token() {
            return Ok(Some(token));
        }
        if self.inner.tokens.read().refresh_token.is_none() {
            return Ok(None);
        }
        self.refresh_access_token().await
    }

    async fn refresh_access_token(&self) -> Result<Option<String>> {
        let inner = Arc::clone(&self.inner);
        self.inner.refresh.run(move || async move { inner.refresh().await }).await
    }

    /// Access token for authenticated calls, or `Unauthenticated`.
    async fn require_access_token(&self) -> Result<String> {
        self.refresh_access_token_if_needed().await?.ok_or(AuthgearError::Unauthenticated)
    }

    /// # Errors
    /// `Unauthenticated` without a session, otherwise refresh and userinfo
    /// failures.
    pub async fn fetch_user_info(&self) -> Result<UserInfo> {
        let access_token = self.require_access_token().await?;
        self.inner.oauth.fetch_user_info(&access_token).await
    }

    /// Obtain a new id token for the current session.
    ///
    /// # Errors
    /// `Unauthenticated` without a session, otherwise protocol failures.
    pub async fn refresh_id_token(&self) -> Result<()> {
        let access_token = self.require_access_token().await?;
        let inner = &self.inner;
        let request = TokenRequest {
            access_token: Some(access_token),
            device_secret: inner.storage.get(StorageKey::DeviceSecret).await?,
            ..TokenRequest::new(GrantType::IdToken, &inner.config.client_id)
        };
        let response = inner.oauth.exchange_token(&request).await?;
        if let Some(id_token) = response.id_token {
            inner.storage.set(StorageKey::IdToken, &id_token).await?;
            inner.tokens.write().id_token = Some(id_token);
        }
        Ok(())
    }

    /// Revoke the refresh token and remove all local session state.
    ///
    /// With `force`, a failed revocation is logged and local state is cleared
    /// anyway; without it the error is returned and nothing changes.
    ///
    /// # Errors
    /// The revocation failure when `force` is false, or storage failures.
    pub async fn logout(&self, force: bool) -> Result<()> {
        let inner = &self.inner;
        inner.require_configured()?;
        let refresh_token = inner.tokens.read().refresh_token.clone();
        if let Some(refresh_token) = refresh_token {
            if let Err(err) = inner.oauth.revoke(&refresh_token).await {
                if !force {
                    return Err(err);
                }
                warn!(error = %err, "Revocation failed, clearing local session anyway");
            }
        }
        inner.clear_session(SessionStateChangeReason::Logout).await?;
        inner.delete_device_keys().await
    }

    /// Forget the session locally without contacting the server.
    ///
    /// # Errors
    /// Storage failures.
    pub async fn clear_session_state(&self) -> Result<()> {
        self.inner.require_configured()?;
        self.inner.clear_session(SessionStateChangeReason::Clear).await
    }
}

impl Inner {
    fn require_configured(&self) -> Result<()> {
        if self.configured.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthgearError::NotConfigured)
        }
    }

    fn valid_access_token(&self) -> Option<String> {
        let tokens = self.tokens.read();
        let expire_at = tokens.expire_at?;
        let margin = TimeDelta::try_seconds(ACCESS_TOKEN_SKEW_SECONDS)?;
        if Utc::now() + margin < expire_at {
            tokens.access_token.clone()
        } else {
            None
        }
    }

    /// base64url of the configured device info JSON.
    fn device_info_param(&self) -> Option<String> {
        self.config.device_info.as_ref().map(|info| URL_SAFE_NO_PAD.encode(info.to_string()))
    }

    async fn refresh(&self) -> Result<Option<String>> {
        if let Some(token) = self.valid_access_token() {
            return Ok(Some(token));
        }
        let (refresh_token, generation) = {
            let tokens = self.tokens.read();
            (tokens.refresh_token.clone(), tokens.generation)
        };
        let Some(refresh_token) = refresh_token else {
            return Ok(None);
        };
        debug!(namespace = %self.config.name, "Refreshing access token");
        let request = TokenRequest {
            refresh_token: Some(refresh_token),
            x_device_info: self.device_info_param(),
            ..TokenRequest::new(GrantType::RefreshToken, &self.config.client_id)
        };
        let result = self.oauth.exchange_token(&request).await;
        if self.tokens.read().generation != generation {
            debug!(namespace = %self.config.name, "Session changed during refresh, discarding result");
            return result.map(|_| None);
        }
        match result {
            Ok(response) => self.save_refreshed_tokens(&response, generation).await,
            Err(err) if err.is_invalid_grant() => {
                info!(error = %err, "Refresh token rejected, session expired");
                self.clear_session(SessionStateChangeReason::Expired).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Commit a refresh result unless the session it belongs to has ended.
    ///
    /// A session that ended while the tokens were being written gets its
    /// stored tokens put back to the in-memory state.
    async fn save_refreshed_tokens(
        &self,
        response: &TokenResponse,
        generation: u64,
    ) -> Result<Option<String>> {
        self.persist_tokens(response).await?;
        let committed = {
            let mut tokens = self.tokens.write();
            let current = tokens.generation == generation;
            if current {
                tokens.apply(response);
                self.session.set_quietly(SessionState::LoggedIn);
            }
            current
        };
        if committed {
            return Ok(response.access_token.clone());
        }
        debug!(namespace = %self.config.name, "Session ended during refresh, restoring storage");
        let (refresh_token, id_token) = {
            let tokens = self.tokens.read();
            (tokens.refresh_token.clone(), tokens.id_token.clone())
        };
        match &refresh_token {
            Some(token) => self.storage.set(StorageKey::RefreshToken, token).await?,
            None => {
                self.storage.delete(StorageKey::RefreshToken).await?;
                self.storage.delete(StorageKey::DeviceSecret).await?;
            }
        }
        match &id_token {
            Some(token) => self.storage.set(StorageKey::IdToken, token).await?,
            None => self.storage.delete(StorageKey::IdToken).await?,
        }
        Ok(None)
    }

    /// Persist tokens from a successful grant and enter `LoggedIn` with
    /// `reason`, starting a new session generation.
    async fn save_tokens(
        &self,
        response: &TokenResponse,
        reason: SessionStateChangeReason,
    ) -> Result<()> {
        self.persist_tokens(response).await?;
        {
            let mut tokens = self.tokens.write();
            tokens.generation = tokens.generation.wrapping_add(1);
            tokens.apply(response);
            self.session.transition(SessionState::LoggedIn, reason);
        }
        Ok(())
    }

    async fn persist_tokens(&self, response: &TokenResponse) -> Result<()> {
        if let Some(refresh_token) = &response.refresh_token {
            self.storage.set(StorageKey::RefreshToken, refresh_token).await?;
        }
        if let Some(id_token) = &response.id_token {
            self.storage.set(StorageKey::IdToken, id_token).await?;
        }
        if let Some(device_secret) = &response.device_secret {
            self.storage.set(StorageKey::DeviceSecret, device_secret).await?;
        }
        Ok(())
    }

    async fn clear_session(&self, reason: SessionStateChangeReason) -> Result<()> {
        {
            let mut tokens = self.tokens.write();
            *tokens = tokens.next(None, None);
            self.session.transition(SessionState::NoSession, reason);
        }
        self.storage.delete(StorageKey::RefreshToken).await?;
        self.storage.delete(StorageKey::IdToken).await?;
        self.storage.delete(StorageKey::DeviceSecret).await
    }

    async fn delete_device_keys(&self) -> Result<()> {
        self.anonymous_keys.delete_key().await?;
        self.biometric_keys.delete_key().await?;
        self.app2app.delete_key().await?;
        if let Some(dpop) = &self.dpop {
            dpop.delete_key().await?;
        }
        Ok(())
    }

    /// Base `code` request with the container defaults applied.
    fn authorization_request(&self, redirect_uri: &str) -> AuthorizationRequest {
        AuthorizationRequest {
            is_sso_enabled: self.config.is_sso_enabled,
            ui_locales: self.config.ui_locales.clone(),
            color_scheme: self.config.color_scheme,
            ..AuthorizationRequest::code(redirect_uri, self.config.platform.as_str())
        }
    }

    /// Authorization URL from discovery, bound to the DPoP key if enabled.
    async fn authorization_url(&self, mut request: AuthorizationRequest) -> Result<Url> {
        let configuration = self.oauth.discover().await?;
        if let Some(dpop) = &self.dpop {
            request.dpop_jkt = Some(dpop.thumbprint().await?);
        }
        request.to_url(&configuration.authorization_endpoint, &self.config.client_id)
    }

    /// Attach a fresh PKCE pair, persist its verifier and build the URL.
    async fn prepare_code_request(&self, mut request: AuthorizationRequest) -> Result<Url> {
        let pkce = PkceChallenge::generate();
        self.storage.set(StorageKey::Verifier, &pkce.verifier).await?;
        request.code_challenge = Some(pkce.challenge);
        self.authorization_url(request).await
    }

    /// Present `request` with a fresh PKCE pair and exchange the code.
    ///
    /// The verifier is removed whatever the outcome.
    async fn run_code_flow(
        &self,
        request: AuthorizationRequest,
        grant_type: GrantType,
        access_token: Option<String>,
    ) -> Result<(AuthorizationResponse, TokenResponse)> {
        let redirect_uri = request.redirect_uri.clone();
        let url = self.prepare_code_request(request).await?;
        let response = match self.present(&url, &redirect_uri).await {
            Ok(response) => response,
            Err(err) => {
                self.storage.delete(StorageKey::Verifier).await?;
                return Err(err);
            }
        };
        let tokens = self.exchange_code(grant_type, &response, &redirect_uri, access_token).await?;
        Ok((response, tokens))
    }

    /// Show the page and wait for the redirect.
    async fn present(&self, url: &Url, redirect_uri: &str) -> Result<AuthorizationResponse> {
        let redirect = self.presenter.open_authorization_url(url, redirect_uri).await?;
        self.handle_wechat_redirect(&redirect);
        parse_redirect(&redirect)
    }

    /// Publish a WeChat request if `url` carries one.
    fn handle_wechat_redirect(&self, url: &Url) {
        if let Some((_, state)) = url.query_pairs().find(|(k, _)| k == "x_wechat_state") {
            debug!("Publishing WeChat auth request");
            // No subscribers is fine.
            let _ = self.wechat.send(WechatAuthRequest { state: state.into_owned() });
        }
    }

    /// Exchange an authorization code with the persisted verifier.
    ///
    /// The verifier is removed whatever the outcome.
    async fn exchange_code(
        &self,
        grant_type: GrantType,
        response: &AuthorizationResponse,
        redirect_uri: &str,
        access_token: Option<String>,
    ) -> Result<TokenResponse> {
        let code = response
            .code
            .clone()
            .ok_or_else(|| AuthgearError::oauth("invalid_request", "redirect carries no code"));
        let result = match code {
            Ok(code) => self.exchange_code_inner(grant_type, code, redirect_uri, access_token).await,
            Err(err) => Err(err),
        };
        let cleanup = self.storage.delete(StorageKey::Verifier).await;
        let tokens = result?;
        cleanup?;
        Ok(tokens)
    }

    async fn exchange_code_inner(
        &self,
        grant_type: GrantType,
        code: String,
        redirect_uri: &str,
        access_token: Option<String>,
    ) -> Result<TokenResponse> {
        let mut request = TokenRequest {
            code: Some(code),
            redirect_uri: Some(redirect_uri.to_string()),
            code_verifier: self.storage.get(StorageKey::Verifier).await?,
            access_token,
            x_device_info: self.device_info_param(),
            ..TokenRequest::new(grant_type, &self.config.client_id)
        };
        if grant_type == GrantType::AuthorizationCode && self.config.app2app.is_enabled {
            let challenge = self.oauth.challenge(CHALLENGE_PURPOSE_APP2APP).await?;
            request.x_app2app_device_key_jwt =
                Some(self.app2app.generate_jwt(&challenge.token, true).await?);
        }
        self.oauth.exchange_token(&request).await
    }

    /// Proof JWT for `action`, signed by a purpose-bound device key.
    async fn device_jwt(
        &self,
        keys: &DeviceKeyManager,
        key: &DeviceKey,
        challenge: String,
        action: JwtAction,
        authorization: SignAuthorization,
    ) -> Result<String> {
        let payload = JwtPayload {
            challenge: Some(challenge),
            action: Some(action),
            device_info: self.config.device_info.clone(),
            ..JwtPayload::issued_at(Utc::now().timestamp())
        };
        jwt::sign(keys.keystore(), keys.purpose().header_type(), key, &payload, authorization).await
    }

    /// Save tokens with `reason` and fetch the user they belong to.
    async fn finish_with_tokens(
        &self,
        response: &TokenResponse,
        reason: SessionStateChangeReason,
    ) -> Result<UserInfo> {
        self.save_tokens(response, reason).await?;
        let access_token = response
            .access_token
            .as_deref()
            .ok_or_else(|| AuthgearError::UnexpectedResponse {
                status: 200,
                body: "token response carries no access_token".to_string(),
            })?;
        self.oauth.fetch_user_info(access_token).await
    }
}

#[cfg(test)]
mod tests;
