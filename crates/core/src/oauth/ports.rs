//! Port interface for the authorization server
//!
//! The infra layer implements this over HTTP. Every call carries a DPoP proof
//! when the implementation is configured with a [`crate::keys::DPoPProvider`].

use async_trait::async_trait;
use authgear_domain::{
    AppSessionTokenResponse, ChallengeResponse, OidcConfiguration, Result, TokenRequest,
    TokenResponse, UserInfo,
};

/// OIDC and Authgear protocol endpoints
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Discovery document, fetched once and cached.
    async fn discover(&self) -> Result<OidcConfiguration>;

    /// Form POST to the token endpoint.
    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenResponse>;

    /// Register a biometric key with the session identified by
    /// `request.access_token`. No response body.
    async fn biometric_setup(&self, request: &TokenRequest) -> Result<()>;

    /// Revoke a refresh token.
    async fn revoke(&self, refresh_token: &str) -> Result<()>;

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo>;

    /// Server nonce for a device-key proof.
    async fn challenge(&self, purpose: &str) -> Result<ChallengeResponse>;

    async fn app_session_token(&self, refresh_token: &str) -> Result<AppSessionTokenResponse>;

    /// Forward a WeChat authorization code to the server.
    async fn wechat_callback(&self, code: &str, state: &str) -> Result<()>;
}
