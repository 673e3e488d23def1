//! Shared fixtures for the infra integration tests

use std::sync::Arc;

use authgear_core::testing::FakeKeyStore;
use authgear_core::{DPoPKeyManager, DPoPProvider};
use authgear_domain::AuthgearConfig;
use authgear_infra::{HttpClient, OAuthClient};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Configuration pointing at `server`, with the HTTP layer tuned for tests.
pub fn config_for(server: &MockServer) -> AuthgearConfig {
    let mut config = AuthgearConfig::new("client-id", server.uri());
    config.http.backoff_ms = 5;
    config
}

/// Serve a discovery document whose endpoints all live on `server`.
pub async fn mount_discovery(server: &MockServer) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authorization_endpoint": format!("{base}/oauth2/authorize"),
            "token_endpoint": format!("{base}/oauth2/token"),
            "userinfo_endpoint": format!("{base}/oauth2/userinfo"),
            "revocation_endpoint": format!("{base}/oauth2/revoke"),
            "end_session_endpoint": format!("{base}/oauth2/end_session"),
        })))
        .mount(server)
        .await;
}

/// Protocol client without DPoP.
pub fn oauth_client(server: &MockServer) -> OAuthClient {
    let config = config_for(server);
    let http = HttpClient::builder().settings(&config.http).build().expect("http client");
    OAuthClient::new(&config, http).expect("oauth client")
}

/// Protocol client signing DPoP proofs with a fake keystore.
pub fn dpop_oauth_client(server: &MockServer) -> OAuthClient {
    let config = config_for(server);
    let storage = authgear_core::testing::memory_session_storage(&config.name);
    let dpop: Arc<dyn DPoPProvider> =
        Arc::new(DPoPKeyManager::new(Arc::new(FakeKeyStore::new()), storage));
    let http = HttpClient::builder().settings(&config.http).dpop(dpop).build().expect("http client");
    OAuthClient::new(&config, http).expect("oauth client")
}

/// Form body of a recorded request as key/value pairs.
pub fn form(request: &wiremock::Request) -> Vec<(String, String)> {
    url::form_urlencoded::parse(&request.body).into_owned().collect()
}

pub fn form_value(request: &wiremock::Request, key: &str) -> Option<String> {
    form(request).into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}
