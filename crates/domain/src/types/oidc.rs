//! OIDC wire types: discovery document, token endpoint request/response and
//! the Authgear-specific JSON APIs.

use serde::{Deserialize, Serialize};

/// Discovery document served at `/.well-known/openid-configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfiguration {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub end_session_endpoint: String,
}

/// Grant types accepted by the token endpoint. The raw strings must match
/// the server exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "refresh_token")]
    RefreshToken,
    #[serde(rename = "urn:authgear:params:oauth:grant-type:anonymous-request")]
    Anonymous,
    #[serde(rename = "urn:authgear:params:oauth:grant-type:biometric-request")]
    Biometric,
    #[serde(rename = "urn:authgear:params:oauth:grant-type:id-token")]
    IdToken,
    #[serde(rename = "urn:authgear:params:oauth:grant-type:app2app-request")]
    App2App,
    #[serde(rename = "urn:authgear:params:oauth:grant-type:settings-action")]
    SettingsAction,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:token-exchange")]
    TokenExchange,
}

impl GrantType {
    /// Wire value of the grant type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Anonymous => "urn:authgear:params:oauth:grant-type:anonymous-request",
            Self::Biometric => "urn:authgear:params:oauth:grant-type:biometric-request",
            Self::IdToken => "urn:authgear:params:oauth:grant-type:id-token",
            Self::App2App => "urn:authgear:params:oauth:grant-type:app2app-request",
            Self::SettingsAction => "urn:authgear:params:oauth:grant-type:settings-action",
            Self::TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
        }
    }
}

/// Token type identifiers used by token exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "urn:ietf:params:oauth:token-type:id_token")]
    IdToken,
    #[serde(rename = "urn:x-oath:params:oauth:token-type:device-secret")]
    DeviceSecret,
    #[serde(rename = "urn:authgear:params:oauth:token-type:pre-authenticated-url-token")]
    PreAuthenticatedUrlToken,
}

impl TokenType {
    /// Wire value of the token type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdToken => "urn:ietf:params:oauth:token-type:id_token",
            Self::DeviceSecret => "urn:x-oath:params:oauth:token-type:device-secret",
            Self::PreAuthenticatedUrlToken => {
                "urn:authgear:params:oauth:token-type:pre-authenticated-url-token"
            }
        }
    }
}

/// Token endpoint request. Only fields that are set end up in the form body.
///
/// `access_token` is sent as a bearer `Authorization` header, never in the
/// body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub grant_type: GrantType,
    pub client_id: String,
    pub x_device_info: Option<String>,
    pub redirect_uri: Option<String>,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub jwt: Option<String>,
    pub x_app2app_device_key_jwt: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub device_secret: Option<String>,
    pub requested_token_type: Option<TokenType>,
    pub audience: Option<String>,
    pub subject_token_type: Option<TokenType>,
    pub subject_token: Option<String>,
    pub actor_token_type: Option<TokenType>,
    pub actor_token: Option<String>,
    pub scope: Option<Vec<String>>,
}

impl TokenRequest {
    /// A request with only the mandatory fields set.
    pub fn new(grant_type: GrantType, client_id: impl Into<String>) -> Self {
        Self {
            grant_type,
            client_id: client_id.into(),
            x_device_info: None,
            redirect_uri: None,
            code: None,
            code_verifier: None,
            refresh_token: None,
            access_token: None,
            jwt: None,
            x_app2app_device_key_jwt: None,
            code_challenge: None,
            code_challenge_method: None,
            device_secret: None,
            requested_token_type: None,
            audience: None,
            subject_token_type: None,
            subject_token: None,
            actor_token_type: None,
            actor_token: None,
            scope: None,
        }
    }

    /// Form body fields in a stable order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("grant_type", self.grant_type.as_str().to_string()),
            ("client_id", self.client_id.clone()),
        ];
        let mut push = |key: &'static str, value: Option<&String>| {
            if let Some(value) = value {
                fields.push((key, value.clone()));
            }
        };
        push("x_device_info", self.x_device_info.as_ref());
        push("redirect_uri", self.redirect_uri.as_ref());
        push("code", self.code.as_ref());
        push("code_verifier", self.code_verifier.as_ref());
        push("refresh_token", self.refresh_token.as_ref());
        push("jwt", self.jwt.as_ref());
        push("x_app2app_device_key_jwt", self.x_app2app_device_key_jwt.as_ref());
        push("code_challenge", self.code_challenge.as_ref());
        push("code_challenge_method", self.code_challenge_method.as_ref());
        push("device_secret", self.device_secret.as_ref());
        push("audience", self.audience.as_ref());
        push("subject_token", self.subject_token.as_ref());
        push("actor_token", self.actor_token.as_ref());

        if let Some(token_type) = self.requested_token_type {
            fields.push(("requested_token_type", token_type.as_str().to_string()));
        }
        if let Some(token_type) = self.subject_token_type {
            fields.push(("subject_token_type", token_type.as_str().to_string()));
        }
        if let Some(token_type) = self.actor_token_type {
            fields.push(("actor_token_type", token_type.as_str().to_string()));
        }
        if let Some(scope) = &self.scope {
            fields.push(("scope", scope.join(" ")));
        }
        fields
    }
}

/// Token endpoint response. Every field is optional because different grants
/// return different subsets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub device_secret: Option<String>,
}

/// `{"result": ...}` envelope used by the Authgear JSON APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub result: T,
}

/// Server-issued nonce embedded in device-key proof JWTs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub token: String,
    pub expire_at: String,
}

/// Short-lived token that lets a web page adopt the app's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSessionTokenResponse {
    pub app_session_token: String,
    pub expire_at: String,
}
