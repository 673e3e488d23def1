//! Unit tests for the Authgear container.

use std::sync::Arc;
use std::time::Duration;

use authgear_domain::constants::KEY_ALIAS_PREFIX;
use authgear_domain::{
    App2AppAuthenticateOptions, App2AppAuthenticateRequest, AuthenticateOptions, AuthgearConfig,
    AuthgearError, BiometricError, BiometricOptions, GrantType, PreAuthenticatedUrlOptions,
    PromoteOptions, ReauthenticateOptions, ServerError, SessionState, SessionStateChangeReason,
    SettingsAction, SettingsActionOptions, TokenResponse,
};
use futures::future::join_all;
use serde_json::json;
use url::Url;

use super::*;
use crate::jwt::decode_payload;
use crate::pkce::generate_code_challenge;
use crate::storage::StorageKey;
use crate::testing::{
    fake_id_token, memory_session_storage, FakeKeyStore, ScriptedBiometricPrompt,
    ScriptedOAuthProvider, ScriptedPresenter,
};

const REDIRECT_URI: &str = "com.example://host/path";

struct Fixture {
    authgear: Authgear,
    oauth: Arc<ScriptedOAuthProvider>,
    keystore: Arc<FakeKeyStore>,
    storage: SessionStorage,
    presenter: Arc<ScriptedPresenter>,
    biometric: Arc<ScriptedBiometricPrompt>,
}

fn config() -> AuthgearConfig {
    AuthgearConfig::new("client-id", "https://auth.example.com")
}

fn fixture_with(config: AuthgearConfig, presenter: ScriptedPresenter) -> Fixture {
    let oauth = Arc::new(ScriptedOAuthProvider::default());
    let keystore = Arc::new(FakeKeyStore::new());
    let storage = memory_session_storage(&config.name);
    let presenter = Arc::new(presenter);
    let biometric = Arc::new(ScriptedBiometricPrompt::new());
    let dpop = Arc::new(DPoPKeyManager::new(keystore.clone(), storage.clone()));
    let authgear = Authgear::builder(config)
        .with_oauth(oauth.clone())
        .with_keystore(keystore.clone())
        .with_storage(storage.clone())
        .with_presenter(presenter.clone())
        .with_biometric_prompt(biometric.clone())
        .with_dpop(dpop)
        .build()
        .unwrap();
    Fixture { authgear, oauth, keystore, storage, presenter, biometric }
}

fn fixture() -> Fixture {
    fixture_with(config(), ScriptedPresenter::with_code("auth-code"))
}

/// Configured fixture with a signed-in session.
async fn signed_in() -> Fixture {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    f
}

fn query(url: &Url) -> std::collections::HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

fn invalid_grant_server_error() -> AuthgearError {
    AuthgearError::Server(ServerError {
        name: "InvalidGrant".into(),
        reason: "InvalidGrant".into(),
        message: "refresh token expired".into(),
        info: None,
    })
}

/// Validates `Authgear::configure` behavior for the no stored token scenario.
///
/// Assertions:
/// - Confirms the state becomes `NoSession` with reason `NoToken`.
/// - Ensures no network request is made.
#[tokio::test]
async fn test_configure_without_token() {
    let f = fixture();
    let rx = f.authgear.subscribe();
    f.authgear.configure().await.unwrap();

    let change = *rx.borrow();
    assert_eq!(change.state, SessionState::NoSession);
    assert_eq!(change.reason, Some(SessionStateChangeReason::NoToken));
    assert!(f.oauth.token_requests().is_empty());
}

/// Validates `Authgear::configure` behavior for the stored refresh token
/// scenario.
///
/// Assertions:
/// - Confirms the state becomes `LoggedIn` with reason `FoundToken`.
/// - Confirms the access token is only fetched on demand.
#[tokio::test]
async fn test_configure_with_stored_token() {
    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt-stored").await.unwrap();
    f.authgear.configure().await.unwrap();

    let change = *f.authgear.subscribe().borrow();
    assert_eq!(change.state, SessionState::LoggedIn);
    assert_eq!(change.reason, Some(SessionStateChangeReason::FoundToken));
    assert!(f.authgear.access_token().is_none());

    let token = f.authgear.refresh_access_token_if_needed().await.unwrap();
    assert_eq!(token.as_deref(), Some("at-1"));
    let refresh = f.oauth.token_requests_with(GrantType::RefreshToken);
    assert_eq!(refresh[0].refresh_token.as_deref(), Some("rt-stored"));
}

/// Validates `ConfigureOptions::refresh_access_token` behavior for the
/// rejected refresh token scenario.
///
/// Assertions:
/// - Ensures `invalid_grant` during configure is swallowed.
/// - Confirms the session ends with reason `Expired`.
#[tokio::test]
async fn test_configure_refresh_swallows_invalid_grant() {
    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt-stored").await.unwrap();
    f.oauth.push_token_response(Err(AuthgearError::oauth("invalid_grant", "revoked")));

    f.authgear.configure_with(ConfigureOptions { refresh_access_token: true }).await.unwrap();
    let change = *f.authgear.subscribe().borrow();
    assert_eq!(change.state, SessionState::NoSession);
    assert_eq!(change.reason, Some(SessionStateChangeReason::Expired));
}

/// Validates `Authgear` behavior for the unconfigured container scenario.
///
/// Assertions:
/// - Ensures flows fail with `NotConfigured` before `configure`.
#[tokio::test]
async fn test_operations_require_configure() {
    let f = fixture();
    let result = f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await;
    assert!(matches!(result, Err(AuthgearError::NotConfigured)));
    assert!(matches!(
        f.authgear.refresh_access_token_if_needed().await,
        Err(AuthgearError::NotConfigured)
    ));
    assert!(matches!(f.authgear.logout(true).await, Err(AuthgearError::NotConfigured)));
}

/// Validates `AuthgearBuilder::build` behavior for the missing port scenario.
///
/// Assertions:
/// - Ensures a builder without an OAuth provider is rejected.
/// - Ensures a storage namespace mismatch is rejected.
#[test]
fn test_builder_validates_ports() {
    let result = Authgear::builder(config()).build();
    assert!(matches!(result, Err(AuthgearError::Config(_))));

    let result = Authgear::builder(config())
        .with_oauth(Arc::new(ScriptedOAuthProvider::default()))
        .with_keystore(Arc::new(FakeKeyStore::new()))
        .with_storage(memory_session_storage("other"))
        .with_presenter(Arc::new(ScriptedPresenter::with_code("c")))
        .build();
    assert!(matches!(result, Err(AuthgearError::Config(_))));
}

/// Validates `Authgear::authenticate` behavior for the successful code flow
/// scenario.
///
/// Assertions:
/// - Confirms the URL carries the S256 challenge of the exchanged verifier.
/// - Confirms `dpop_jkt` is sent when DPoP is enabled.
/// - Confirms tokens are persisted and the verifier is removed.
/// - Confirms `LoggedIn` is reached with reason `Authorized`.
#[tokio::test]
async fn test_authenticate_code_flow() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    let options = AuthenticateOptions {
        state: Some("my-state".into()),
        ..AuthenticateOptions::new(REDIRECT_URI)
    };
    let result = f.authgear.authenticate(options).await.unwrap();
    assert_eq!(result.user_info.sub, "user-1");
    assert_eq!(result.state.as_deref(), Some("my-state"));

    let params = f.presenter.last_query();
    assert_eq!(params["client_id"], "client-id");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["redirect_uri"], REDIRECT_URI);
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["x_platform"], "rust");
    assert!(params.contains_key("dpop_jkt"));

    let exchange = &f.oauth.token_requests_with(GrantType::AuthorizationCode)[0];
    assert_eq!(exchange.code.as_deref(), Some("auth-code"));
    assert_eq!(exchange.redirect_uri.as_deref(), Some(REDIRECT_URI));
    let verifier = exchange.code_verifier.clone().unwrap();
    assert_eq!(params["code_challenge"], generate_code_challenge(&verifier));
    assert!(exchange.x_app2app_device_key_jwt.is_none());

    assert_eq!(f.storage.get(StorageKey::RefreshToken).await.unwrap().as_deref(), Some("rt-1"));
    assert_eq!(f.storage.get(StorageKey::DeviceSecret).await.unwrap().as_deref(), Some("ds-1"));
    assert!(f.storage.get(StorageKey::IdToken).await.unwrap().is_some());
    assert!(f.storage.get(StorageKey::Verifier).await.unwrap().is_none());
    assert_eq!(f.authgear.access_token().as_deref(), Some("at-1"));

    let change = *f.authgear.subscribe().borrow();
    assert_eq!(change.state, SessionState::LoggedIn);
    assert_eq!(change.reason, Some(SessionStateChangeReason::Authorized));
}

/// Validates `Authgear::authenticate` behavior for the `error=access_denied`
/// redirect scenario.
///
/// Assertions:
/// - Ensures the OAuth error surfaces with its description.
/// - Ensures no token request is made and the verifier is removed.
/// - Confirms the session stays `NoSession`.
#[tokio::test]
async fn test_authenticate_access_denied() {
    let f = fixture_with(config(), ScriptedPresenter::with_error("access_denied", "User declined"));
    f.authgear.configure().await.unwrap();

    match f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await {
        Err(AuthgearError::OAuth(err)) => {
            assert_eq!(err.error, "access_denied");
            assert_eq!(err.error_description.as_deref(), Some("User declined"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(f.oauth.token_requests().is_empty());
    assert!(f.storage.get(StorageKey::Verifier).await.unwrap().is_none());
    assert_eq!(f.authgear.session_state(), SessionState::NoSession);
}

/// Validates `Authgear::authenticate` behavior for the dismissed page
/// scenario.
///
/// Assertions:
/// - Ensures `error=cancel` surfaces as `Cancelled`.
/// - Ensures a presenter cancellation surfaces as `Cancelled`.
#[tokio::test]
async fn test_authenticate_cancelled() {
    let f = fixture_with(config(), ScriptedPresenter::with_error("cancel", "closed"));
    f.authgear.configure().await.unwrap();
    let result = f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await;
    assert!(matches!(result, Err(AuthgearError::Cancelled)));

    let f = fixture_with(config(), ScriptedPresenter::new(|_, _| Err(AuthgearError::Cancelled)));
    f.authgear.configure().await.unwrap();
    let result = f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await;
    assert!(matches!(result, Err(AuthgearError::Cancelled)));
    assert!(f.storage.get(StorageKey::Verifier).await.unwrap().is_none());
}

/// Validates `Authgear::finish_authentication` behavior for the
/// caller-presented page scenario.
///
/// Assertions:
/// - Confirms a redirect without `code` is an `invalid_request` OAuth error.
/// - Confirms a redirect with `code` completes the sign in.
#[tokio::test]
async fn test_create_and_finish_authentication() {
    let f = fixture();
    f.authgear.configure().await.unwrap();

    let request =
        f.authgear.create_authentication_request(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    let empty = Url::parse(REDIRECT_URI).unwrap();
    match f.authgear.finish_authentication(&request, &empty).await {
        Err(AuthgearError::OAuth(err)) => assert_eq!(err.error, "invalid_request"),
        other => panic!("unexpected {other:?}"),
    }

    let request =
        f.authgear.create_authentication_request(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    let redirect = Url::parse(&format!("{REDIRECT_URI}?code=manual")).unwrap();
    f.authgear.finish_authentication(&request, &redirect).await.unwrap();
    assert_eq!(f.authgear.session_state(), SessionState::LoggedIn);
}

/// Validates `Authgear::refresh_access_token_if_needed` behavior for the
/// concurrent callers scenario.
///
/// Assertions:
/// - Confirms ten concurrent callers cause exactly one token request.
/// - Confirms every caller receives the same access token.
/// - Ensures a silent refresh does not notify subscribers.
#[tokio::test]
async fn test_concurrent_refresh_is_single_flight() {
    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt-stored").await.unwrap();
    f.authgear.configure().await.unwrap();
    f.oauth.set_exchange_delay(Duration::from_millis(50));
    let mut rx = f.authgear.subscribe();
    rx.borrow_and_update();

    let calls = (0..10).map(|_| {
        let authgear = f.authgear.clone();
        tokio::spawn(async move { authgear.refresh_access_token_if_needed().await })
    });
    for result in join_all(calls).await {
        assert_eq!(result.unwrap().unwrap().as_deref(), Some("at-1"));
    }
    assert_eq!(f.oauth.token_requests_with(GrantType::RefreshToken).len(), 1);
    assert!(!rx.has_changed().unwrap());

    // Cached token is reused without network
    f.authgear.refresh_access_token_if_needed().await.unwrap();
    assert_eq!(f.oauth.token_requests().len(), 1);
}

/// Validates `Authgear::refresh_access_token_if_needed` behavior for the
/// structured `InvalidGrant` server error scenario.
///
/// Assertions:
/// - Ensures the error reaches every waiter.
/// - Confirms the session ends with reason `Expired` and storage is cleared.
#[tokio::test]
async fn test_refresh_server_invalid_grant_expires_session() {
    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt-stored").await.unwrap();
    f.storage.set(StorageKey::DeviceSecret, "ds").await.unwrap();
    f.authgear.configure().await.unwrap();
    f.oauth.set_exchange_delay(Duration::from_millis(20));
    f.oauth.push_token_response(Err(invalid_grant_server_error()));

    let (first, second) = tokio::join!(
        f.authgear.refresh_access_token_if_needed(),
        f.authgear.refresh_access_token_if_needed()
    );
    assert!(first.unwrap_err().is_invalid_grant());
    assert!(second.unwrap_err().is_invalid_grant());
    assert_eq!(f.oauth.token_requests().len(), 1);

    let change = *f.authgear.subscribe().borrow();
    assert_eq!(change.state, SessionState::NoSession);
    assert_eq!(change.reason, Some(SessionStateChangeReason::Expired));
    assert!(f.storage.get(StorageKey::RefreshToken).await.unwrap().is_none());
    assert!(f.storage.get(StorageKey::DeviceSecret).await.unwrap().is_none());

    assert_eq!(f.authgear.refresh_access_token_if_needed().await.unwrap(), None);
}

/// Validates `Authgear::refresh_access_token_if_needed` behavior for the
/// transient failure scenario.
///
/// Assertions:
/// - Ensures a network error keeps the session.
#[tokio::test]
async fn test_refresh_network_error_keeps_session() {
    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt-stored").await.unwrap();
    f.authgear.configure().await.unwrap();
    f.oauth.push_token_response(Err(AuthgearError::Network("offline".into())));

    let result = f.authgear.refresh_access_token_if_needed().await;
    assert!(matches!(result, Err(AuthgearError::Network(_))));
    assert_eq!(f.authgear.session_state(), SessionState::LoggedIn);
    assert!(f.storage.get(StorageKey::RefreshToken).await.unwrap().is_some());
}

/// Validates `Authgear::logout` behavior for the failed revocation scenario.
///
/// Assertions:
/// - Ensures `force=false` propagates the error and keeps the session.
/// - Ensures `force=true` clears the session with reason `Logout`.
/// - Confirms every device key is removed.
#[tokio::test]
async fn test_logout_force_semantics() {
    let f = signed_in().await;
    f.authgear.authenticate_anonymously().await.unwrap();
    assert!(!f.keystore.is_empty());
    f.oauth.set_revoke_error(Some(AuthgearError::Network("offline".into())));

    assert!(matches!(f.authgear.logout(false).await, Err(AuthgearError::Network(_))));
    assert_eq!(f.authgear.session_state(), SessionState::LoggedIn);
    assert!(f.storage.get(StorageKey::RefreshToken).await.unwrap().is_some());

    f.authgear.logout(true).await.unwrap();
    let change = *f.authgear.subscribe().borrow();
    assert_eq!(change.state, SessionState::NoSession);
    assert_eq!(change.reason, Some(SessionStateChangeReason::Logout));
    assert_eq!(f.oauth.revocation_count(), 2);
    for key in [
        StorageKey::RefreshToken,
        StorageKey::IdToken,
        StorageKey::DeviceSecret,
        StorageKey::AnonymousKeyId,
        StorageKey::DPoPKeyId,
    ] {
        assert!(f.storage.get(key).await.unwrap().is_none(), "{key:?} not cleared");
    }
    assert!(f.keystore.is_empty());
    assert!(f.authgear.access_token().is_none());
}

/// Validates `Authgear::logout` behavior for the refresh in flight
/// scenario.
///
/// Assertions:
/// - Confirms the refresh that finishes after logout hands out no token.
/// - Ensures the session stays `NoSession` with reason `Logout`.
/// - Ensures neither the rotated refresh token nor the access token is
///   written back.
#[tokio::test]
async fn test_logout_during_refresh_discards_result() {
    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt-stored").await.unwrap();
    f.authgear.configure().await.unwrap();
    f.oauth.set_exchange_delay(Duration::from_millis(100));

    let authgear = f.authgear.clone();
    let refresh = tokio::spawn(async move { authgear.refresh_access_token_if_needed().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    f.authgear.logout(false).await.unwrap();
    let mut rx = f.authgear.subscribe();
    rx.borrow_and_update();

    assert_eq!(refresh.await.unwrap().unwrap(), None);
    assert_eq!(f.oauth.token_requests_with(GrantType::RefreshToken).len(), 1);
    assert_eq!(f.authgear.session_state(), SessionState::NoSession);
    assert_eq!(rx.borrow().reason, Some(SessionStateChangeReason::Logout));
    assert!(!rx.has_changed().unwrap());
    assert!(f.authgear.access_token().is_none());
    assert!(f.storage.get(StorageKey::RefreshToken).await.unwrap().is_none());
    assert_eq!(f.authgear.refresh_access_token_if_needed().await.unwrap(), None);
}

/// Validates `Authgear::logout` behavior for the rejected refresh in flight
/// scenario.
///
/// Assertions:
/// - Confirms the waiter still sees the rejection.
/// - Ensures the late rejection does not replace `Logout` with `Expired`.
#[tokio::test]
async fn test_logout_during_rejected_refresh_keeps_logout_reason() {
    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt-stored").await.unwrap();
    f.authgear.configure().await.unwrap();
    f.oauth.set_exchange_delay(Duration::from_millis(100));
    f.oauth.push_token_response(Err(invalid_grant_server_error()));

    let authgear = f.authgear.clone();
    let refresh = tokio::spawn(async move { authgear.refresh_access_token_if_needed().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    f.authgear.logout(false).await.unwrap();

    assert!(refresh.await.unwrap().unwrap_err().is_invalid_grant());
    let change = *f.authgear.subscribe().borrow();
    assert_eq!(change.state, SessionState::NoSession);
    assert_eq!(change.reason, Some(SessionStateChangeReason::Logout));
}

/// Validates `Inner::refresh` behavior for the token refreshed meanwhile
/// scenario.
///
/// Assertions:
/// - Confirms a flight started while a valid token exists reuses it.
/// - Ensures no refresh request is sent.
#[tokio::test]
async fn test_refresh_flight_reuses_valid_token() {
    let f = signed_in().await;
    let token = f.authgear.inner.refresh().await.unwrap();
    assert_eq!(token.as_deref(), Some("at-1"));
    assert!(f.oauth.token_requests_with(GrantType::RefreshToken).is_empty());
}

/// Validates `Authgear::clear_session_state` behavior for the local-only
/// sign out scenario.
///
/// Assertions:
/// - Confirms reason `Clear` and no revocation request.
#[tokio::test]
async fn test_clear_session_state() {
    let f = signed_in().await;
    f.authgear.clear_session_state().await.unwrap();
    let change = *f.authgear.subscribe().borrow();
    assert_eq!(change.reason, Some(SessionStateChangeReason::Clear));
    assert_eq!(f.oauth.revocation_count(), 0);
}

/// Validates `Authgear::fetch_user_info` behavior for the signed out and
/// signed in scenarios.
///
/// Assertions:
/// - Ensures no session yields `Unauthenticated`.
/// - Confirms the current access token is used.
#[tokio::test]
async fn test_fetch_user_info() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    assert!(matches!(f.authgear.fetch_user_info().await, Err(AuthgearError::Unauthenticated)));

    let f = signed_in().await;
    let info = f.authgear.fetch_user_info().await.unwrap();
    assert_eq!(info.custom["access_token_seen"], json!("at-1"));
}

/// Validates `Authgear::refresh_id_token` behavior for the id token grant
/// scenario.
///
/// Assertions:
/// - Confirms the grant carries the access token and device secret.
/// - Confirms the new id token replaces the old one.
#[tokio::test]
async fn test_refresh_id_token() {
    let f = signed_in().await;
    f.oauth.set_id_token_claims(json!({ "sub": "user-1", "auth_time": 1_800_000_000 }));
    f.authgear.refresh_id_token().await.unwrap();

    let request = &f.oauth.token_requests_with(GrantType::IdToken)[0];
    assert_eq!(request.access_token.as_deref(), Some("at-1"));
    assert_eq!(request.device_secret.as_deref(), Some("ds-1"));
    assert_eq!(f.authgear.auth_time().unwrap().timestamp(), 1_800_000_000);
}

/// Validates `Authgear::authenticate_anonymously` behavior for the key
/// lifecycle scenario.
///
/// Assertions:
/// - Confirms the JWT carries action `auth` and the challenge.
/// - Confirms the key id is persisted after sign in and reused afterwards.
#[tokio::test]
async fn test_authenticate_anonymously_persists_key_after_tokens() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    f.authgear.authenticate_anonymously().await.unwrap();

    let request = &f.oauth.token_requests_with(GrantType::Anonymous)[0];
    let payload = decode_payload(request.jwt.as_deref().unwrap()).unwrap();
    assert_eq!(payload["action"], "auth");
    assert_eq!(payload["challenge"], "challenge-1");
    assert_eq!(f.oauth.challenge_purposes(), vec!["anonymous_request"]);

    let kid = f.storage.get(StorageKey::AnonymousKeyId).await.unwrap().unwrap();
    assert!(f.keystore.contains(&format!("{KEY_ALIAS_PREFIX}.anonymous.{kid}")));
    assert_eq!(f.authgear.session_state(), SessionState::LoggedIn);

    f.authgear.authenticate_anonymously().await.unwrap();
    assert_eq!(f.storage.get(StorageKey::AnonymousKeyId).await.unwrap(), Some(kid));
}

/// Validates `Authgear::authenticate_anonymously` behavior for the rejected
/// grant scenario.
///
/// Assertions:
/// - Ensures a new key id is not persisted when the exchange fails.
/// - Ensures the unused keypair is deleted.
#[tokio::test]
async fn test_authenticate_anonymously_failure_discards_new_key() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    f.oauth.push_token_response(Err(AuthgearError::oauth("invalid_grant", "bad jwt")));
    let keys_before = f.keystore.len();

    assert!(f.authgear.authenticate_anonymously().await.is_err());
    assert!(f.storage.get(StorageKey::AnonymousKeyId).await.unwrap().is_none());
    assert_eq!(f.keystore.len(), keys_before);
}

/// Validates `Authgear::promote_anonymous_user` behavior for the promotion
/// scenario.
///
/// Assertions:
/// - Ensures promotion without an anonymous user fails.
/// - Confirms `prompt=login` and an anonymous login hint with a `promote` JWT.
/// - Confirms the anonymous key is removed afterwards.
#[tokio::test]
async fn test_promote_anonymous_user() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    let result = f.authgear.promote_anonymous_user(PromoteOptions::new(REDIRECT_URI)).await;
    assert!(matches!(result, Err(AuthgearError::AnonymousUserNotFound)));

    f.authgear.authenticate_anonymously().await.unwrap();
    f.authgear.promote_anonymous_user(PromoteOptions::new(REDIRECT_URI)).await.unwrap();

    let params = f.presenter.last_query();
    assert_eq!(params["prompt"], "login");
    let hint = Url::parse(&params["login_hint"]).unwrap();
    let hint_params = query(&hint);
    assert_eq!(hint_params["type"], "anonymous");
    let payload = decode_payload(&hint_params["jwt"]).unwrap();
    assert_eq!(payload["action"], "promote");

    assert!(f.storage.get(StorageKey::AnonymousKeyId).await.unwrap().is_none());
    assert_eq!(f.authgear.session_state(), SessionState::LoggedIn);
}

/// Validates `Authgear::enable_biometric` and
/// `Authgear::authenticate_biometric` behavior for the round trip scenario.
///
/// Assertions:
/// - Confirms setup sends a `setup` JWT with the access token.
/// - Confirms sign in sends an `authenticate` JWT with the biometric grant.
/// - Confirms the prompt runs for each signature.
#[tokio::test]
async fn test_biometric_round_trip() {
    let f = signed_in().await;
    let options = BiometricOptions::default();
    assert!(!f.authgear.is_biometric_enabled().await.unwrap());

    f.authgear.enable_biometric(&options).await.unwrap();
    assert!(f.authgear.is_biometric_enabled().await.unwrap());
    let setup = &f.oauth.biometric_setups()[0];
    assert_eq!(setup.access_token.as_deref(), Some("at-1"));
    assert_eq!(decode_payload(setup.jwt.as_deref().unwrap()).unwrap()["action"], "setup");

    f.authgear.clear_session_state().await.unwrap();
    f.authgear.authenticate_biometric(&options).await.unwrap();
    let request = &f.oauth.token_requests_with(GrantType::Biometric)[0];
    assert_eq!(decode_payload(request.jwt.as_deref().unwrap()).unwrap()["action"], "authenticate");
    assert_eq!(f.biometric.prompt_count(), 2);
    assert_eq!(f.authgear.session_state(), SessionState::LoggedIn);
}

/// Validates `Authgear::authenticate_biometric` behavior for the failure
/// scenarios.
///
/// Assertions:
/// - Ensures sign in without a key fails with `BiometricPrivateKeyNotFound`.
/// - Ensures a dismissed prompt surfaces as `Cancelled` and keeps the key.
/// - Ensures lockout propagates as a biometric error.
/// - Ensures `invalid_grant` disables biometrics.
#[tokio::test]
async fn test_biometric_failures() {
    let f = signed_in().await;
    let options = BiometricOptions::default();
    assert!(matches!(
        f.authgear.authenticate_biometric(&options).await,
        Err(AuthgearError::BiometricPrivateKeyNotFound)
    ));

    f.authgear.enable_biometric(&options).await.unwrap();
    f.biometric.set_outcome(Some(BiometricError::UserCanceled));
    assert!(matches!(
        f.authgear.authenticate_biometric(&options).await,
        Err(AuthgearError::Cancelled)
    ));
    assert!(f.authgear.is_biometric_enabled().await.unwrap());

    f.biometric.set_outcome(Some(BiometricError::Lockout));
    assert!(matches!(
        f.authgear.authenticate_biometric(&options).await,
        Err(AuthgearError::Biometric(BiometricError::Lockout))
    ));

    f.biometric.set_outcome(None);
    f.oauth.push_token_response(Err(AuthgearError::oauth("invalid_grant", "key revoked")));
    assert!(f.authgear.authenticate_biometric(&options).await.unwrap_err().is_invalid_grant());
    assert!(!f.authgear.is_biometric_enabled().await.unwrap());
}

/// Validates `Authgear::enable_biometric` behavior for the cancelled prompt
/// scenario.
///
/// Assertions:
/// - Ensures the error is `Cancelled` and no key is left behind.
#[tokio::test]
async fn test_enable_biometric_cancelled_leaves_no_key() {
    let f = signed_in().await;
    let keys_before = f.keystore.len();
    f.biometric.set_outcome(Some(BiometricError::NegativeButton));

    let result = f.authgear.enable_biometric(&BiometricOptions::default()).await;
    assert!(matches!(result, Err(AuthgearError::Cancelled)));
    assert!(!f.authgear.is_biometric_enabled().await.unwrap());
    assert_eq!(f.keystore.len(), keys_before);
    assert!(f.oauth.biometric_setups().is_empty());
}

/// Validates `Authgear::approve_app2app_request` behavior for the session
/// and no-session scenarios.
///
/// Assertions:
/// - Ensures no session redirects with `invalid_grant`.
/// - Confirms approval uses the requester's client id and PKCE challenge.
/// - Confirms the redirect carries the issued code.
#[tokio::test]
async fn test_approve_app2app_request() {
    let request = App2AppAuthenticateRequest {
        authorization_endpoint: "https://other.example.com/app2app".into(),
        redirect_uri: "https://requester.example.com/cb".into(),
        client_id: "requester".into(),
        code_challenge: "challenge-xyz".into(),
        state: None,
    };

    let f = fixture();
    f.authgear.configure().await.unwrap();
    let denied = f.authgear.approve_app2app_request(&request).await.unwrap();
    let params = query(&denied);
    assert_eq!(params["error"], "invalid_grant");
    assert_eq!(params["error_description"], "unauthenticated");

    let f = signed_in().await;
    let approved = f.authgear.approve_app2app_request(&request).await.unwrap();
    assert!(query(&approved)["code"].starts_with("app2app-code-"));
    let exchange = &f.oauth.token_requests_with(GrantType::App2App)[0];
    assert_eq!(exchange.client_id, "requester");
    assert_eq!(exchange.code_challenge.as_deref(), Some("challenge-xyz"));
    assert_eq!(exchange.code_challenge_method.as_deref(), Some("S256"));
    assert_eq!(exchange.refresh_token.as_deref(), Some("rt-1"));
    assert!(f.storage.get(StorageKey::App2AppDeviceKeyId).await.unwrap().is_some());
}

/// Validates `Authgear::approve_app2app_request` behavior for the server
/// error scenario.
///
/// Assertions:
/// - Confirms structured server errors are reported as `server_error`.
/// - Ensures `error_description` carries the server message alone.
#[tokio::test]
async fn test_approve_app2app_request_server_error() {
    let f = signed_in().await;
    f.oauth.push_token_response(Err(invalid_grant_server_error()));
    let request = App2AppAuthenticateRequest {
        authorization_endpoint: "https://other.example.com/app2app".into(),
        redirect_uri: "https://requester.example.com/cb".into(),
        client_id: "requester".into(),
        code_challenge: "c".into(),
        state: None,
    };
    let redirect = f.authgear.approve_app2app_request(&request).await.unwrap();
    let params = query(&redirect);
    assert_eq!(params["error"], "server_error");
    assert_eq!(params["error_description"], "refresh token expired");
}

/// Validates `Authgear::start_app2app_authentication` behavior for the
/// requesting side scenario.
///
/// Assertions:
/// - Confirms the request URL carries this client and an S256 challenge.
/// - Confirms the returned code is exchanged with the stored verifier.
#[tokio::test]
async fn test_start_app2app_authentication() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    let options = App2AppAuthenticateOptions {
        authorization_endpoint: "https://other.example.com/app2app".into(),
        redirect_uri: "https://me.example.com/cb".into(),
        state: None,
    };
    f.authgear.start_app2app_authentication(options).await.unwrap();

    let opened = &f.presenter.opened_urls()[0];
    let params = query(opened);
    assert_eq!(opened.path(), "/app2app");
    assert_eq!(params["client_id"], "client-id");
    let parsed = f.authgear.parse_app2app_request(opened).unwrap();
    let exchange = &f.oauth.token_requests_with(GrantType::AuthorizationCode)[0];
    assert_eq!(
        generate_code_challenge(exchange.code_verifier.as_deref().unwrap()),
        parsed.code_challenge
    );
    assert_eq!(f.authgear.session_state(), SessionState::LoggedIn);
}

/// Validates `Authgear::authenticate` behavior for the app2app-enabled
/// scenario.
///
/// Assertions:
/// - Confirms each code exchange carries a device key JWT.
/// - Confirms the key is rotated on every new session.
#[tokio::test]
async fn test_app2app_enabled_code_exchange_binds_device_key() {
    let mut config = config();
    config.app2app.is_enabled = true;
    let f = fixture_with(config, ScriptedPresenter::with_code("auth-code"));
    f.authgear.configure().await.unwrap();

    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    let first = f.storage.get(StorageKey::App2AppDeviceKeyId).await.unwrap().unwrap();
    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    let second = f.storage.get(StorageKey::App2AppDeviceKeyId).await.unwrap().unwrap();
    assert_ne!(first, second);

    for exchange in f.oauth.token_requests_with(GrantType::AuthorizationCode) {
        let jwt = exchange.x_app2app_device_key_jwt.unwrap();
        assert_eq!(decode_payload(&jwt).unwrap()["action"], "setup");
    }
    assert!(!f.keystore.contains(&format!("{KEY_ALIAS_PREFIX}.app2app.{first}")));
}

/// Validates `Authgear::make_pre_authenticated_url` behavior for the
/// precondition failure scenarios.
///
/// Assertions:
/// - Ensures a missing id token yields `PreAuthenticatedUrlIdTokenNotFound`.
/// - Ensures a missing scope yields `PreAuthenticatedUrlInsufficientScope`.
/// - Ensures a missing device secret yields
///   `PreAuthenticatedUrlDeviceSecretNotFound`.
#[tokio::test]
async fn test_pre_authenticated_url_preconditions() {
    let options = PreAuthenticatedUrlOptions {
        client_id: "web-client".into(),
        redirect_uri: "https://web.example.com/cb".into(),
        state: None,
    };

    let f = fixture();
    f.authgear.configure().await.unwrap();
    assert!(matches!(
        f.authgear.make_pre_authenticated_url(options.clone()).await,
        Err(AuthgearError::PreAuthenticatedUrlIdTokenNotFound)
    ));

    let f = signed_in().await;
    assert!(matches!(
        f.authgear.make_pre_authenticated_url(options.clone()).await,
        Err(AuthgearError::PreAuthenticatedUrlInsufficientScope)
    ));

    let f = fixture();
    f.oauth.set_id_token_claims(json!({
        "sub": "user-1",
        "scope": "openid https://authgear.com/scopes/pre-authenticated-url",
    }));
    f.authgear.configure().await.unwrap();
    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    f.storage.delete(StorageKey::DeviceSecret).await.unwrap();
    assert!(matches!(
        f.authgear.make_pre_authenticated_url(options).await,
        Err(AuthgearError::PreAuthenticatedUrlDeviceSecretNotFound)
    ));
}

/// Validates `Authgear::make_pre_authenticated_url` behavior for the token
/// exchange scenario.
///
/// Assertions:
/// - Confirms the exchange uses the id token, device secret and audience.
/// - Confirms the URL targets the web client with the exchanged token.
/// - Confirms a rotated device secret is stored.
#[tokio::test]
async fn test_pre_authenticated_url_exchange() {
    let f = fixture();
    f.oauth.set_id_token_claims(json!({
        "sub": "user-1",
        "scope": "openid https://authgear.com/scopes/pre-authenticated-url",
    }));
    f.authgear.configure().await.unwrap();
    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    let id_token = f.authgear.id_token().unwrap();

    let url = f
        .authgear
        .make_pre_authenticated_url(PreAuthenticatedUrlOptions {
            client_id: "web-client".into(),
            redirect_uri: "https://web.example.com/cb".into(),
            state: Some("s".into()),
        })
        .await
        .unwrap();

    let exchange = &f.oauth.token_requests_with(GrantType::TokenExchange)[0];
    assert_eq!(exchange.subject_token.as_deref(), Some(id_token.as_str()));
    assert_eq!(exchange.actor_token.as_deref(), Some("ds-1"));
    assert_eq!(exchange.audience.as_deref(), Some("https://auth.example.com"));

    let params = query(&url);
    assert_eq!(params["client_id"], "web-client");
    assert_eq!(
        params["response_type"],
        "urn:authgear:params:oauth:response-type:pre-authenticated-url token"
    );
    assert_eq!(params["prompt"], "none");
    assert_eq!(params["state"], "s");
    assert!(params["x_pre_authenticated_url_token"].starts_with("pre-authenticated-"));
    assert!(params.contains_key("id_token_hint"));
    assert!(!params.contains_key("scope"));
    assert_eq!(f.storage.get(StorageKey::DeviceSecret).await.unwrap().as_deref(), Some("ds-2"));
}

/// Validates `Authgear::settings_action` behavior for the change password
/// scenario.
///
/// Assertions:
/// - Confirms the settings-action response type and app session login hint.
/// - Confirms the exchange uses the settings-action grant and keeps the
///   session unchanged.
#[tokio::test]
async fn test_settings_action() {
    let f = signed_in().await;
    let mut rx = f.authgear.subscribe();
    rx.borrow_and_update();

    f.authgear
        .settings_action(SettingsAction::ChangePassword, SettingsActionOptions::new(REDIRECT_URI))
        .await
        .unwrap();

    let params = f.presenter.last_query();
    assert_eq!(params["response_type"], "urn:authgear:params:oauth:response-type:settings-action");
    assert_eq!(params["x_settings_action"], "change_password");
    assert_eq!(params["prompt"], "none");
    assert_eq!(params["scope"], "openid https://authgear.com/scopes/full-access");
    let hint = query(&Url::parse(&params["login_hint"]).unwrap());
    assert_eq!(hint["type"], "app_session_token");
    assert_eq!(hint["app_session_token"], "app-session-token");

    let exchange = &f.oauth.token_requests_with(GrantType::SettingsAction)[0];
    assert!(exchange.code_verifier.is_some());
    assert!(!rx.has_changed().unwrap());
}

/// Validates `Authgear::reauthenticate` behavior for the code flow
/// scenario.
///
/// Assertions:
/// - Confirms `max_age=0` and the current id token as hint.
/// - Ensures no id token yields `Unauthenticated`.
#[tokio::test]
async fn test_reauthenticate_code_flow() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    let result = f.authgear.reauthenticate(ReauthenticateOptions::new(REDIRECT_URI), None).await;
    assert!(matches!(result, Err(AuthgearError::Unauthenticated)));

    let f = signed_in().await;
    let id_token = f.authgear.id_token().unwrap();
    f.authgear.reauthenticate(ReauthenticateOptions::new(REDIRECT_URI), None).await.unwrap();
    let params = f.presenter.last_query();
    assert_eq!(params["max_age"], "0");
    assert_eq!(params["id_token_hint"], id_token);
    assert!(!params.contains_key("prompt"));
}

/// Validates `Authgear::reauthenticate` behavior for the biometric
/// scenario.
///
/// Assertions:
/// - Confirms an enabled biometric key is used instead of a page.
#[tokio::test]
async fn test_reauthenticate_prefers_biometric() {
    let f = signed_in().await;
    let biometric = BiometricOptions::default();
    f.authgear.enable_biometric(&biometric).await.unwrap();
    let pages = f.presenter.opened_urls().len();

    f.authgear
        .reauthenticate(ReauthenticateOptions::new(REDIRECT_URI), Some(&biometric))
        .await
        .unwrap();
    assert_eq!(f.presenter.opened_urls().len(), pages);
    assert_eq!(f.oauth.token_requests_with(GrantType::Biometric).len(), 1);
}

/// Validates `Authgear::open_url` behavior for the authenticated page
/// scenario.
///
/// Assertions:
/// - Confirms the page is the endpoint path with response type `none`.
#[tokio::test]
async fn test_open_url_uses_app_session_token() {
    let f = signed_in().await;
    f.authgear.open_url("/settings").await.unwrap();
    let params = f.presenter.last_query();
    assert_eq!(params["redirect_uri"], "https://auth.example.com/settings");
    assert_eq!(params["response_type"], "none");
    assert!(params["login_hint"].contains("app_session_token"));
}

/// Validates WeChat redirect handling for the authorization scenario.
///
/// Assertions:
/// - Confirms a redirect with `x_wechat_state` is published to subscribers.
/// - Confirms the callback is forwarded to the server.
#[tokio::test]
async fn test_wechat_redirect_is_published() {
    let presenter = ScriptedPresenter::new(|_, redirect_uri| {
        Ok(Url::parse(&format!("{redirect_uri}?code=auth-code&x_wechat_state=wx-state")).unwrap())
    });
    let f = fixture_with(config(), presenter);
    f.authgear.configure().await.unwrap();
    let mut requests = f.authgear.wechat_requests();

    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    assert_eq!(requests.recv().await.unwrap().state, "wx-state");

    f.authgear.wechat_auth_callback("wx-code", "wx-state").await.unwrap();
    assert_eq!(f.oauth.wechat_calls(), vec![("wx-code".to_string(), "wx-state".to_string())]);
}

/// Validates `Authgear::id_token_claims` behavior for the claim accessors
/// scenario.
///
/// Assertions:
/// - Confirms `can_reauthenticate` reads the Authgear claim.
/// - Ensures a malformed stored id token surfaces as `MalformedJwt`.
#[tokio::test]
async fn test_id_token_accessors() {
    let f = fixture();
    f.oauth.set_id_token_claims(json!({
        "sub": "user-1",
        "https://authgear.com/claims/user/can_reauthenticate": true,
    }));
    f.authgear.configure().await.unwrap();
    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();
    assert!(f.authgear.can_reauthenticate());

    let f = fixture();
    f.storage.set(StorageKey::RefreshToken, "rt").await.unwrap();
    f.storage.set(StorageKey::IdToken, "not-a-jwt").await.unwrap();
    f.authgear.configure().await.unwrap();
    assert!(matches!(f.authgear.id_token_claims(), Err(AuthgearError::MalformedJwt(_))));
    assert!(!f.authgear.can_reauthenticate());
    assert_eq!(fake_id_token(&json!({})).split('.').count(), 3);
}

/// Validates `Authgear::authenticate` behavior for the scripted token
/// response scenario.
///
/// Assertions:
/// - Confirms a response without `expires_in` leaves the token refreshable.
#[tokio::test]
async fn test_token_without_expiry_is_refreshed() {
    let f = fixture();
    f.authgear.configure().await.unwrap();
    f.oauth.push_token_response(Ok(TokenResponse {
        access_token: Some("no-expiry".into()),
        refresh_token: Some("rt-x".into()),
        ..TokenResponse::default()
    }));
    f.authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await.unwrap();

    let token = f.authgear.refresh_access_token_if_needed().await.unwrap();
    assert_ne!(token.as_deref(), Some("no-expiry"));
    assert_eq!(f.oauth.token_requests_with(GrantType::RefreshToken).len(), 1);
}
