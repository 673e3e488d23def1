//! OIDC and Authgear endpoints over reqwest
//!
//! Failed responses are decoded in this order: an `error` object carrying
//! `name`, `reason` and `message` becomes [`ServerError`], an `error` string
//! becomes [`OAuthError`], anything else (including an unparseable body) is
//! reported as `UnexpectedResponse` with the raw body.

use async_trait::async_trait;
use authgear_core::OAuthProvider;
use authgear_domain::constants::{
    APP_SESSION_TOKEN_PATH, CHALLENGE_PATH, WECHAT_CALLBACK_PATH, WELL_KNOWN_OPENID_CONFIGURATION,
};
use authgear_domain::{
    ApiResult, AppSessionTokenResponse, AuthgearConfig, AuthgearError, ChallengeResponse,
    OAuthError, OidcConfiguration, Result, ServerError, TokenRequest, TokenResponse, UserInfo,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::errors::InfraError;
use crate::http::HttpClient;

/// Protocol client for one Authgear endpoint
pub struct OAuthClient {
    http: HttpClient,
    endpoint: Url,
    platform: String,
    configuration: OnceCell<OidcConfiguration>,
}

impl OAuthClient {
    /// # Errors
    /// `Config` if the endpoint is not an http(s) URL.
    pub fn new(config: &AuthgearConfig, http: HttpClient) -> Result<Self> {
        Ok(Self {
            http,
            endpoint: config.endpoint_url()?,
            platform: config.platform.clone(),
            configuration: OnceCell::new(),
        })
    }

    async fn fetch_configuration(&self) -> Result<OidcConfiguration> {
        let url = join(&self.endpoint, WELL_KNOWN_OPENID_CONFIGURATION)?;
        debug!(%url, "Fetching OIDC configuration");
        let response = self.http.send(self.http.request(Method::GET, url)).await?;
        read_json(response).await
    }

    /// `path` on the origin of the authorization endpoint.
    async fn api_url(&self, path: &str) -> Result<Url> {
        let configuration = self.discover().await?;
        let authorization = Url::parse(&configuration.authorization_endpoint).map_err(|e| {
            AuthgearError::UnexpectedResponse {
                status: 200,
                body: format!("invalid authorization_endpoint: {e}"),
            }
        })?;
        join(&authorization, path)
    }

    async fn token_endpoint(&self) -> Result<Url> {
        let configuration = self.discover().await?;
        parse_endpoint(&configuration.token_endpoint)
    }

    fn token_post(&self, url: Url, request: &TokenRequest) -> RequestBuilder {
        let builder = self.http.request(Method::POST, url).form(&request.form_fields());
        match &request.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl OAuthProvider for OAuthClient {
    async fn discover(&self) -> Result<OidcConfiguration> {
        self.configuration.get_or_try_init(|| self.fetch_configuration()).await.cloned()
    }

    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenResponse> {
        let url = self.token_endpoint().await?;
        debug!(grant_type = request.grant_type.as_str(), "Token request");
        let response = self.http.send(self.token_post(url, request)).await?;
        read_json(response).await
    }

    async fn biometric_setup(&self, request: &TokenRequest) -> Result<()> {
        let url = self.token_endpoint().await?;
        let response = self.http.send(self.token_post(url, request)).await?;
        expect_success(response).await
    }

    async fn revoke(&self, refresh_token: &str) -> Result<()> {
        let configuration = self.discover().await?;
        let url = parse_endpoint(&configuration.revocation_endpoint)?;
        let builder = self.http.request(Method::POST, url).form(&[("token", refresh_token)]);
        expect_success(self.http.send(builder).await?).await
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let configuration = self.discover().await?;
        let url = parse_endpoint(&configuration.userinfo_endpoint)?;
        let builder = self.http.request(Method::GET, url).bearer_auth(access_token);
        read_json(self.http.send(builder).await?).await
    }

    async fn challenge(&self, purpose: &str) -> Result<ChallengeResponse> {
        let url = self.api_url(CHALLENGE_PATH).await?;
        let builder = self.http.request(Method::POST, url).json(&json!({ "purpose": purpose }));
        let envelope: ApiResult<ChallengeResponse> =
            read_json(self.http.send(builder).await?).await?;
        Ok(envelope.result)
    }

    async fn app_session_token(&self, refresh_token: &str) -> Result<AppSessionTokenResponse> {
        let url = self.api_url(APP_SESSION_TOKEN_PATH).await?;
        let builder =
            self.http.request(Method::POST, url).json(&json!({ "refresh_token": refresh_token }));
        let envelope: ApiResult<AppSessionTokenResponse> =
            read_json(self.http.send(builder).await?).await?;
        Ok(envelope.result)
    }

    async fn wechat_callback(&self, code: &str, state: &str) -> Result<()> {
        let url = self.api_url(WECHAT_CALLBACK_PATH).await?;
        let builder = self.http.request(Method::POST, url).form(&[
            ("code", code),
            ("state", state),
            ("x_platform", self.platform.as_str()),
        ]);
        expect_success(self.http.send(builder).await?).await
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| AuthgearError::Config(format!("invalid endpoint path {path}: {e}")))
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| AuthgearError::UnexpectedResponse {
        status: 200,
        body: format!("invalid endpoint {raw}: {e}"),
    })
}

async fn read_body(response: Response) -> Result<(u16, String)> {
    let status = response.status();
    let body = response.text().await.map_err(InfraError::from)?;
    if status.is_success() {
        Ok((status.as_u16(), body))
    } else {
        Err(decode_error(status.as_u16(), &body))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let (status, body) = read_body(response).await?;
    serde_json::from_str(&body).map_err(|_| AuthgearError::UnexpectedResponse { status, body })
}

async fn expect_success(response: Response) -> Result<()> {
    read_body(response).await.map(|_| ())
}

/// Decode the body of a non-2xx response.
pub(crate) fn decode_error(status: u16, body: &str) -> AuthgearError {
    let unexpected = || AuthgearError::UnexpectedResponse { status, body: body.to_string() };
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return unexpected();
    };
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

    match value.get("error") {
        Some(error @ Value::Object(_)) => serde_json::from_value::<ServerError>(error.clone())
            .map_or_else(|_| unexpected(), AuthgearError::Server),
        Some(Value::String(error)) => AuthgearError::OAuth(OAuthError {
            error: error.clone(),
            error_description: text("error_description"),
            state: text("state"),
            error_uri: text("error_uri"),
        }),
        _ => unexpected(),
    }
}
