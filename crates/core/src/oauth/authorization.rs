//! Authorization endpoint request and URL construction

use authgear_domain::constants::{CODE_CHALLENGE_METHOD, DEFAULT_SCOPES, RESPONSE_TYPE_CODE};
use authgear_domain::{AuthgearError, ColorScheme, PromptOption, Result, SettingsAction};
use url::Url;

/// Parameters of one authorization request
///
/// Optional parameters are only added to the URL when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: Vec<String>,
    pub is_sso_enabled: bool,
    pub platform: String,
    /// PKCE challenge; `None` for flows without a code exchange.
    pub code_challenge: Option<String>,
    pub state: Option<String>,
    pub x_state: Option<String>,
    pub prompt: Option<Vec<PromptOption>>,
    pub login_hint: Option<String>,
    pub ui_locales: Option<Vec<String>>,
    pub color_scheme: Option<ColorScheme>,
    pub id_token_hint: Option<String>,
    pub max_age: Option<u64>,
    pub wechat_redirect_uri: Option<String>,
    pub page: Option<String>,
    pub settings_action: Option<SettingsAction>,
    pub authentication_flow_group: Option<String>,
    pub response_mode: Option<String>,
    pub pre_authenticated_url_token: Option<String>,
    pub dpop_jkt: Option<String>,
}

impl AuthorizationRequest {
    /// A `code` request with the default scopes.
    pub fn code(redirect_uri: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            response_type: RESPONSE_TYPE_CODE.to_string(),
            scope: DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            is_sso_enabled: false,
            platform: platform.into(),
            code_challenge: None,
            state: None,
            x_state: None,
            prompt: None,
            login_hint: None,
            ui_locales: None,
            color_scheme: None,
            id_token_hint: None,
            max_age: None,
            wechat_redirect_uri: None,
            page: None,
            settings_action: None,
            authentication_flow_group: None,
            response_mode: None,
            pre_authenticated_url_token: None,
            dpop_jkt: None,
        }
    }

    /// Query parameters in a stable order.
    pub fn query(&self, client_id: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("client_id", client_id.to_string()),
            ("response_type", self.response_type.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("x_platform", self.platform.clone()),
        ];

        if !self.scope.is_empty() {
            query.push(("scope", self.scope.join(" ")));
        }
        if let Some(challenge) = &self.code_challenge {
            query.push(("code_challenge_method", CODE_CHALLENGE_METHOD.to_string()));
            query.push(("code_challenge", challenge.clone()));
        }
        if let Some(prompt) = &self.prompt {
            let joined = prompt.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(" ");
            query.push(("prompt", joined));
        }
        if let Some(locales) = &self.ui_locales {
            query.push(("ui_locales", locales.join(" ")));
        }
        if let Some(scheme) = self.color_scheme {
            query.push(("x_color_scheme", scheme.as_str().to_string()));
        }
        if let Some(max_age) = self.max_age {
            query.push(("max_age", max_age.to_string()));
        }
        if let Some(action) = self.settings_action {
            query.push(("x_settings_action", action.as_str().to_string()));
        }

        let optional = [
            ("state", &self.state),
            ("x_state", &self.x_state),
            ("login_hint", &self.login_hint),
            ("id_token_hint", &self.id_token_hint),
            ("x_wechat_redirect_uri", &self.wechat_redirect_uri),
            ("x_page", &self.page),
            ("x_authentication_flow_group", &self.authentication_flow_group),
            ("response_mode", &self.response_mode),
            ("x_pre_authenticated_url_token", &self.pre_authenticated_url_token),
            ("dpop_jkt", &self.dpop_jkt),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                query.push((key, value.clone()));
            }
        }

        if !self.is_sso_enabled {
            query.push(("x_suppress_idp_session_cookie", "true".to_string()));
        }
        query.push(("x_sso_enabled", self.is_sso_enabled.to_string()));
        query
    }

    /// The full authorization URL.
    ///
    /// # Errors
    /// Returns `AuthgearError::UnexpectedResponse` if the discovered
    /// authorization endpoint is not a URL.
    pub fn to_url(&self, authorization_endpoint: &str, client_id: &str) -> Result<Url> {
        let mut url = Url::parse(authorization_endpoint).map_err(|e| {
            AuthgearError::UnexpectedResponse {
                status: 200,
                body: format!("invalid authorization_endpoint {authorization_endpoint}: {e}"),
            }
        })?;
        url.query_pairs_mut().extend_pairs(self.query(client_id));
        Ok(url)
    }
}

/// Build a login hint URL `https://authgear.com/login_hint?type=...`.
pub fn login_hint(base: &str, pairs: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(base).map_err(|e| AuthgearError::Internal(e.to_string()))?;
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url.to_string())
}

/// Outcome of the redirect back to `redirect_uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Parse the redirect URL the presenter returned.
///
/// # Errors
/// - `AuthgearError::Cancelled` for `error=cancel`.
/// - `AuthgearError::OAuth` for any other `error`.
pub fn parse_redirect(redirect: &Url) -> Result<AuthorizationResponse> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    let mut error_uri = None;
    for (key, value) in redirect.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            "error_uri" => error_uri = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        if error == "cancel" {
            return Err(AuthgearError::Cancelled);
        }
        return Err(AuthgearError::OAuth(authgear_domain::OAuthError {
            error,
            error_description,
            state,
            error_uri,
        }));
    }
    Ok(AuthorizationResponse { code, state })
}
