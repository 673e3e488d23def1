//! App2app authorization
//!
//! The requesting app sends an [`App2AppAuthenticateRequest`] to an app that
//! already holds a session. That app approves it by exchanging its own refresh
//! token for a code bound to the requester's PKCE challenge, and redirects
//! back with the code or an error.

use authgear_domain::constants::{CHALLENGE_PURPOSE_APP2APP, CODE_CHALLENGE_METHOD};
use authgear_domain::{
    App2AppAuthenticateOptions, App2AppAuthenticateRequest, AuthenticateResult, AuthgearError,
    GrantType, Result, SessionStateChangeReason, TokenRequest,
};
use tracing::{debug, warn};
use url::Url;

use super::{Authgear, Inner};
use crate::oauth::parse_redirect;
use crate::pkce::PkceChallenge;
use crate::storage::StorageKey;

impl Authgear {
    /// Build a request for another app, persisting a fresh PKCE verifier.
    ///
    /// # Errors
    /// `NotConfigured` and storage failures.
    pub async fn create_app2app_request(
        &self,
        options: App2AppAuthenticateOptions,
    ) -> Result<App2AppAuthenticateRequest> {
        let inner = &self.inner;
        inner.require_configured()?;
        let pkce = PkceChallenge::generate();
        inner.storage.set(StorageKey::Verifier, &pkce.verifier).await?;
        Ok(App2AppAuthenticateRequest {
            authorization_endpoint: options.authorization_endpoint,
            redirect_uri: options.redirect_uri,
            client_id: inner.config.client_id.clone(),
            code_challenge: pkce.challenge,
            state: options.state,
        })
    }

    /// Ask another app to authorize this one and sign in with the code it
    /// returns.
    ///
    /// # Errors
    /// `InvalidInput` for an unusable authorization endpoint, `OAuth` if the
    /// other app redirected with an error, otherwise protocol failures.
    pub async fn start_app2app_authentication(
        &self,
        options: App2AppAuthenticateOptions,
    ) -> Result<AuthenticateResult> {
        let inner = &self.inner;
        let request = self.create_app2app_request(options).await?;
        let outcome = async {
            let url = request.to_url().map_err(|e| {
                AuthgearError::InvalidInput(format!("invalid app2app endpoint: {e}"))
            })?;
            let redirect = inner.presenter.open_authorization_url(&url, &request.redirect_uri).await?;
            parse_redirect(&redirect)
        };
        let response = match outcome.await {
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
        Ok(AuthenticateResult { user_info, state: response.state.or(request.state) })
    }

    /// Recognize an incoming app2app request.
    pub fn parse_app2app_request(&self, uri: &Url) -> Option<App2AppAuthenticateRequest> {
        App2AppAuthenticateRequest::parse(uri)
    }

    /// Approve `request` with this app's session.
    ///
    /// Returns the URL to send the requester back to: its redirect URI with
    /// either `code` or `error` and `error_description`.
    ///
    /// # Errors
    /// `InvalidInput` only when the request's redirect URI is not a URL;
    /// every other failure is reported through the returned URL.
    pub async fn approve_app2app_request(&self, request: &App2AppAuthenticateRequest) -> Result<Url> {
        let mut redirect = Url::parse(&request.redirect_uri).map_err(|e| {
            AuthgearError::InvalidInput(format!("invalid app2app redirect_uri: {e}"))
        })?;
        match self.inner.approve_app2app(request).await {
            Ok(code) => {
                debug!(client_id = %request.client_id, "App2app request approved");
                redirect.query_pairs_mut().clear().append_pair("code", &code);
            }
            Err(err) => {
                warn!(error = %err, "App2app request failed");
                let (error, description) = match err {
                    AuthgearError::OAuth(oauth) => (oauth.error, oauth.error_description),
                    AuthgearError::Server(server) => {
                        ("server_error".to_string(), Some(server.message))
                    }
                    other => ("unknown_error".to_string(), Some(other.to_string())),
                };
                let mut query = redirect.query_pairs_mut();
                query.clear().append_pair("error", &error);
                if let Some(description) = description {
                    query.append_pair("error_description", &description);
                }
            }
        }
        Ok(redirect)
    }
}

impl Inner {
    async fn approve_app2app(&self, request: &App2AppAuthenticateRequest) -> Result<String> {
        self.require_configured()?;
        let refresh_token = self
            .tokens
            .read()
            .refresh_token
            .clone()
            .ok_or_else(|| AuthgearError::oauth("invalid_grant", "unauthenticated"))?;
        let challenge = self.oauth.challenge(CHALLENGE_PURPOSE_APP2APP).await?;
        let jwt = self.app2app.generate_jwt(&challenge.token, false).await?;
        let exchange = TokenRequest {
            jwt: Some(jwt),
            code_challenge: Some(request.code_challenge.clone()),
            code_challenge_method: Some(CODE_CHALLENGE_METHOD.to_string()),
            redirect_uri: Some(request.redirect_uri.clone()),
            refresh_token: Some(refresh_token),
            ..TokenRequest::new(GrantType::App2App, &request.client_id)
        };
        self.oauth.exchange_token(&exchange).await?.code.ok_or_else(|| {
            AuthgearError::UnexpectedResponse {
                status: 200,
                body: "app2app response carries no code".to_string(),
            }
        })
    }
}
