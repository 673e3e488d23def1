//! In-memory test doubles for the core ports
//!
//! Enabled by the `test-utils` feature so adapters and integration tests can
//! drive the orchestrator without a server, a keystore or a browser.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authgear_domain::{
    AppSessionTokenResponse, AuthgearError, BiometricError, BiometricOptions, ChallengeResponse,
    CorruptionKind, GrantType, OidcConfiguration, Result, TokenRequest, TokenResponse, UserInfo,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use url::Url;

use crate::interaction::{BiometricPrompt, UiPresenter};
use crate::keys::{KeyPairHandle, KeyProtection, KeyStore, SignAuthorization};
pub use crate::storage::MemoryStorage;
use crate::storage::{SecureStorage, SessionStorage};
use crate::OAuthProvider;

/// [`SessionStorage`] with three independent in-memory stores.
pub fn memory_session_storage(namespace: &str) -> SessionStorage {
    SessionStorage::new(
        namespace,
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
    )
}

/// Store that fails a fixed number of times before delegating
pub struct FlakyStorage {
    inner: Arc<MemoryStorage>,
    error: AuthgearError,
    remaining_failures: AtomicUsize,
    recreates: AtomicUsize,
}

impl FlakyStorage {
    /// Fail the next `failures` calls with `StorageCorrupted { kind }`.
    pub fn new(inner: Arc<MemoryStorage>, kind: CorruptionKind, failures: usize) -> Self {
        Self {
            inner,
            error: AuthgearError::StorageCorrupted { kind, message: "injected".to_string() },
            remaining_failures: AtomicUsize::new(failures),
            recreates: AtomicUsize::new(0),
        }
    }

    /// Fail every call with `error`.
    pub fn failing_with(error: AuthgearError) -> Self {
        Self {
            inner: Arc::new(MemoryStorage::new()),
            error,
            remaining_failures: AtomicUsize::new(usize::MAX),
            recreates: AtomicUsize::new(0),
        }
    }

    pub fn recreate_count(&self) -> usize {
        self.recreates.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SecureStorage for FlakyStorage {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.set(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(namespace, key).await
    }

    async fn recreate(&self, namespace: &str) -> Result<()> {
        self.recreates.fetch_add(1, Ordering::SeqCst);
        self.inner.recreate(namespace).await
    }
}

/// Keystore that fakes RSA with random public parts and hash "signatures"
#[derive(Default)]
pub struct FakeKeyStore {
    keys: Mutex<HashMap<String, KeyPairHandle>>,
    corrupted: Mutex<HashSet<String>>,
    signatures: AtomicUsize,
}

impl FakeKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.keys.lock().contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }

    /// Make `alias` fail to load as a damaged entry until it is deleted.
    pub fn corrupt(&self, alias: &str) {
        self.corrupted.lock().insert(alias.to_string());
    }
}

#[async_trait]
impl KeyStore for FakeKeyStore {
    async fn generate_key_pair(
        &self,
        alias: &str,
        protection: KeyProtection,
    ) -> Result<KeyPairHandle> {
        let mut modulus = vec![0u8; 256];
        rand::thread_rng().fill_bytes(&mut modulus);
        modulus[0] |= 0x80;
        let handle = KeyPairHandle {
            alias: alias.to_string(),
            modulus,
            exponent: vec![0x01, 0x00, 0x01],
            protection,
        };
        self.keys.lock().insert(alias.to_string(), handle.clone());
        Ok(handle)
    }

    async fn get_key_pair(&self, alias: &str) -> Result<Option<KeyPairHandle>> {
        if self.corrupted.lock().contains(alias) {
            return Err(AuthgearError::StorageCorrupted {
                kind: CorruptionKind::MalformedEncoding,
                message: format!("damaged key {alias}"),
            });
        }
        Ok(self.keys.lock().get(alias).cloned())
    }

    async fn delete_key_pair(&self, alias: &str) -> Result<()> {
        self.corrupted.lock().remove(alias);
        self.keys.lock().remove(alias);
        Ok(())
    }

    async fn sign(
        &self,
        handle: &KeyPairHandle,
        data: &[u8],
        authorization: SignAuthorization,
    ) -> Result<Vec<u8>> {
        if !self.contains(&handle.alias) {
            return Err(AuthgearError::KeyStore(format!("no key for alias {}", handle.alias)));
        }
        if handle.protection.requires_user_authentication()
            && authorization != SignAuthorization::UserVerified
        {
            return Err(AuthgearError::Biometric(BiometricError::AuthenticationRequired));
        }
        self.signatures.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(handle.alias.as_bytes());
        hasher.update(data);
        Ok(hasher.finalize().to_vec())
    }
}

/// Unsigned compact JWT with `claims` as payload, for id token fixtures.
pub fn fake_id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2ln")
}

/// Authorization server double with canned responses
///
/// Token requests consume queued responses first and otherwise fall back to
/// a plausible response for the grant type.
pub struct ScriptedOAuthProvider {
    configuration: OidcConfiguration,
    queued: Mutex<VecDeque<Result<TokenResponse>>>,
    requests: Mutex<Vec<TokenRequest>>,
    exchange_delay: Mutex<Option<Duration>>,
    revoke_error: Mutex<Option<AuthgearError>>,
    user_info_error: Mutex<Option<AuthgearError>>,
    id_token_claims: Mutex<serde_json::Value>,
    wechat_calls: Mutex<Vec<(String, String)>>,
    issued: AtomicUsize,
    discoveries: AtomicUsize,
    revocations: AtomicUsize,
    user_info_calls: AtomicUsize,
    challenges: Mutex<Vec<String>>,
    biometric_setups: Mutex<Vec<TokenRequest>>,
}

impl Default for ScriptedOAuthProvider {
    fn default() -> Self {
        Self::new("https://auth.example.com")
    }
}

impl ScriptedOAuthProvider {
    pub fn new(origin: &str) -> Self {
        Self {
            configuration: OidcConfiguration {
                authorization_endpoint: format!("{origin}/oauth2/authorize"),
                token_endpoint: format!("{origin}/oauth2/token"),
                userinfo_endpoint: format!("{origin}/oauth2/userinfo"),
                revocation_endpoint: format!("{origin}/oauth2/revoke"),
                end_session_endpoint: format!("{origin}/oauth2/end_session"),
            },
            queued: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            exchange_delay: Mutex::new(None),
            revoke_error: Mutex::new(None),
            user_info_error: Mutex::new(None),
            id_token_claims: Mutex::new(serde_json::json!({ "sub": "user-1", "auth_time": 1_700_000_000 })),
            wechat_calls: Mutex::new(Vec::new()),
            issued: AtomicUsize::new(0),
            discoveries: AtomicUsize::new(0),
            revocations: AtomicUsize::new(0),
            user_info_calls: AtomicUsize::new(0),
            challenges: Mutex::new(Vec::new()),
            biometric_setups: Mutex::new(Vec::new()),
        }
    }

    /// Respond to the next token request with `response`.
    pub fn push_token_response(&self, response: Result<TokenResponse>) {
        self.queued.lock().push_back(response);
    }

    /// Sleep this long inside every token request.
    pub fn set_exchange_delay(&self, delay: Duration) {
        *self.exchange_delay.lock() = Some(delay);
    }

    pub fn set_revoke_error(&self, error: Option<AuthgearError>) {
        *self.revoke_error.lock() = error;
    }

    pub fn set_user_info_error(&self, error: Option<AuthgearError>) {
        *self.user_info_error.lock() = error;
    }

    /// Claims of id tokens issued from now on.
    pub fn set_id_token_claims(&self, claims: serde_json::Value) {
        *self.id_token_claims.lock() = claims;
    }

    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.requests.lock().clone()
    }

    pub fn token_requests_with(&self, grant_type: GrantType) -> Vec<TokenRequest> {
        self.requests.lock().iter().filter(|r| r.grant_type == grant_type).cloned().collect()
    }

    pub fn discovery_count(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    pub fn revocation_count(&self) -> usize {
        self.revocations.load(Ordering::SeqCst)
    }

    pub fn user_info_count(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    pub fn challenge_purposes(&self) -> Vec<String> {
        self.challenges.lock().clone()
    }

    pub fn biometric_setups(&self) -> Vec<TokenRequest> {
        self.biometric_setups.lock().clone()
    }

    pub fn wechat_calls(&self) -> Vec<(String, String)> {
        self.wechat_calls.lock().clone()
    }

    fn default_response(&self, request: &TokenRequest) -> TokenResponse {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let id_token = Some(fake_id_token(&self.id_token_claims.lock()));
        match request.grant_type {
            GrantType::AuthorizationCode | GrantType::Anonymous | GrantType::Biometric => {
                TokenResponse {
                    id_token,
                    token_type: Some("Bearer".to_string()),
                    access_token: Some(format!("at-{n}")),
                    expires_in: Some(3600),
                    refresh_token: Some(format!("rt-{n}")),
                    code: None,
                    device_secret: Some(format!("ds-{n}")),
                }
            }
            GrantType::RefreshToken => TokenResponse {
                access_token: Some(format!("at-{n}")),
                expires_in: Some(3600),
                ..TokenResponse::default()
            },
            GrantType::IdToken => TokenResponse { id_token, ..TokenResponse::default() },
            GrantType::App2App => {
                TokenResponse { code: Some(format!("app2app-code-{n}")), ..TokenResponse::default() }
            }
            GrantType::TokenExchange => TokenResponse {
                access_token: Some(format!("pre-authenticated-{n}")),
                device_secret: Some(format!("ds-{n}")),
                id_token,
                ..TokenResponse::default()
            },
            GrantType::SettingsAction => TokenResponse::default(),
        }
    }
}

#[async_trait]
impl OAuthProvider for ScriptedOAuthProvider {
    async fn discover(&self) -> Result<OidcConfiguration> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        Ok(self.configuration.clone())
    }

    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenResponse> {
        self.requests.lock().push(request.clone());
        let delay = *self.exchange_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.queued.lock().pop_front();
        match queued {
            Some(response) => response,
            None => Ok(self.default_response(request)),
        }
    }

    async fn biometric_setup(&self, request: &TokenRequest) -> Result<()> {
        self.biometric_setups.lock().push(request.clone());
        Ok(())
    }

    async fn revoke(&self, _refresh_token: &str) -> Result<()> {
        self.revocations.fetch_add(1, Ordering::SeqCst);
        let error = self.revoke_error.lock().clone();
        error.map_or(Ok(()), Err)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.user_info_error.lock().clone() {
            return Err(error);
        }
        Ok(UserInfo {
            sub: "user-1".to_string(),
            custom: HashMap::from([(
                "access_token_seen".to_string(),
                serde_json::Value::String(access_token.to_string()),
            )]),
            ..UserInfo::default()
        })
    }

    async fn challenge(&self, purpose: &str) -> Result<ChallengeResponse> {
        let mut challenges = self.challenges.lock();
        challenges.push(purpose.to_string());
        Ok(ChallengeResponse {
            token: format!("challenge-{}", challenges.len()),
            expire_at: "2030-01-01T00:00:00Z".to_string(),
        })
    }

    async fn app_session_token(&self, _refresh_token: &str) -> Result<AppSessionTokenResponse> {
        Ok(AppSessionTokenResponse {
            app_session_token: "app-session-token".to_string(),
            expire_at: "2030-01-01T00:00:00Z".to_string(),
        })
    }

    async fn wechat_callback(&self, code: &str, state: &str) -> Result<()> {
        self.wechat_calls.lock().push((code.to_string(), state.to_string()));
        Ok(())
    }
}

type Responder = Box<dyn Fn(&Url, &str) -> Result<Url> + Send + Sync>;

/// Presenter that answers every authorization page with a scripted redirect
pub struct ScriptedPresenter {
    responder: Responder,
    opened: Mutex<Vec<Url>>,
}

impl ScriptedPresenter {
    pub fn new(responder: impl Fn(&Url, &str) -> Result<Url> + Send + Sync + 'static) -> Self {
        Self { responder: Box::new(responder), opened: Mutex::new(Vec::new()) }
    }

    /// Redirect with `code` and the request's `state`.
    pub fn with_code(code: &'static str) -> Self {
        Self::new(move |url, redirect_uri| {
            let mut redirect = Url::parse(redirect_uri)
                .map_err(|e| AuthgearError::InvalidInput(e.to_string()))?;
            {
                let mut query = redirect.query_pairs_mut();
                query.append_pair("code", code);
                if let Some((_, state)) = url.query_pairs().find(|(k, _)| k == "state") {
                    query.append_pair("state", &state);
                }
            }
            Ok(redirect)
        })
    }

    /// Redirect with `error` and `error_description`.
    pub fn with_error(error: &'static str, description: &'static str) -> Self {
        Self::new(move |_, redirect_uri| {
            let mut redirect = Url::parse(redirect_uri)
                .map_err(|e| AuthgearError::InvalidInput(e.to_string()))?;
            redirect
                .query_pairs_mut()
                .append_pair("error", error)
                .append_pair("error_description", description);
            Ok(redirect)
        })
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        self.opened.lock().clone()
    }

    /// Query parameters of the most recently opened URL.
    pub fn last_query(&self) -> HashMap<String, String> {
        self.opened
            .lock()
            .last()
            .map(|url| url.query_pairs().into_owned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UiPresenter for ScriptedPresenter {
    async fn open_authorization_url(&self, url: &Url, redirect_uri: &str) -> Result<Url> {
        self.opened.lock().push(url.clone());
        (self.responder)(url, redirect_uri)
    }

    async fn open_url(&self, url: &Url) -> Result<()> {
        self.opened.lock().push(url.clone());
        Ok(())
    }
}

/// Biometric prompt with a scripted outcome
#[derive(Default)]
pub struct ScriptedBiometricPrompt {
    outcome: Mutex<Option<BiometricError>>,
    unsupported: Mutex<Option<BiometricError>>,
    prompts: AtomicUsize,
}

impl ScriptedBiometricPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next prompts fail with `error`; `None` makes them succeed.
    pub fn set_outcome(&self, error: Option<BiometricError>) {
        *self.outcome.lock() = error;
    }

    pub fn set_unsupported(&self, error: Option<BiometricError>) {
        *self.unsupported.lock() = error;
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricPrompt for ScriptedBiometricPrompt {
    async fn check_supported(&self, _options: &BiometricOptions) -> Result<()> {
        let error = self.unsupported.lock().clone();
        error.map_or(Ok(()), |e| Err(AuthgearError::Biometric(e)))
    }

    async fn authenticate(&self, _options: &BiometricOptions) -> Result<()> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let error = self.outcome.lock().clone();
        error.map_or(Ok(()), |e| Err(AuthgearError::Biometric(e)))
    }
}
