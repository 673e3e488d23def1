//! Option structs accepted by the authentication flows

use serde::{Deserialize, Serialize};

use super::user_info::UserInfo;

/// OIDC `prompt` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptOption {
    None,
    Login,
    Consent,
    SelectAccount,
}

impl PromptOption {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Login => "login",
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
        }
    }
}

/// Theme override sent as `x_color_scheme`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Initial page of the authorization UI, sent as `x_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationPage {
    Login,
    Signup,
}

impl AuthenticationPage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Signup => "signup",
        }
    }
}

/// Account settings pages that can be opened with `x_settings_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsAction {
    ChangePassword,
    DeleteAccount,
    AddEmail,
    AddPhone,
    AddUsername,
    ChangeEmail,
    ChangePhone,
    ChangeUsername,
}

impl SettingsAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChangePassword => "change_password",
            Self::DeleteAccount => "delete_account",
            Self::AddEmail => "add_email",
            Self::AddPhone => "add_phone",
            Self::AddUsername => "add_username",
            Self::ChangeEmail => "change_email",
            Self::ChangePhone => "change_phone",
            Self::ChangeUsername => "change_username",
        }
    }
}

/// Authenticator classes the biometric prompt may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiometricAuthenticator {
    BiometricStrong,
    DeviceCredential,
}

/// Options for the interactive authorization-code flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateOptions {
    /// Where the authorization server sends the user back.
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
    /// Opaque value forwarded to the authorization UI as `x_state`.
    #[serde(default)]
    pub x_state: Option<String>,
    #[serde(default)]
    pub prompt: Option<Vec<PromptOption>>,
    #[serde(default)]
    pub login_hint: Option<String>,
    #[serde(default)]
    pub ui_locales: Option<Vec<String>>,
    #[serde(default)]
    pub color_scheme: Option<ColorScheme>,
    /// Required when the project enables WeChat login.
    #[serde(default)]
    pub wechat_redirect_uri: Option<String>,
    #[serde(default)]
    pub page: Option<AuthenticationPage>,
    #[serde(default)]
    pub authentication_flow_group: Option<String>,
    #[serde(default)]
    pub response_mode: Option<String>,
}

impl AuthenticateOptions {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self { redirect_uri: redirect_uri.into(), ..Self::default() }
    }
}

/// Options for re-verifying the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReauthenticateOptions {
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub x_state: Option<String>,
    #[serde(default)]
    pub ui_locales: Option<Vec<String>>,
    #[serde(default)]
    pub color_scheme: Option<ColorScheme>,
    /// OIDC `max_age`; `0` when unset.
    #[serde(default)]
    pub max_age: Option<u64>,
    #[serde(default)]
    pub wechat_redirect_uri: Option<String>,
    #[serde(default)]
    pub authentication_flow_group: Option<String>,
}

impl ReauthenticateOptions {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self { redirect_uri: redirect_uri.into(), ..Self::default() }
    }
}

/// Options for turning the anonymous user into a regular one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteOptions {
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub x_state: Option<String>,
    #[serde(default)]
    pub ui_locales: Option<Vec<String>>,
    #[serde(default)]
    pub color_scheme: Option<ColorScheme>,
    #[serde(default)]
    pub wechat_redirect_uri: Option<String>,
}

impl PromoteOptions {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self { redirect_uri: redirect_uri.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsActionOptions {
    pub redirect_uri: String,
    #[serde(default)]
    pub ui_locales: Option<Vec<String>>,
    #[serde(default)]
    pub color_scheme: Option<ColorScheme>,
    #[serde(default)]
    pub wechat_redirect_uri: Option<String>,
}

impl SettingsActionOptions {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self { redirect_uri: redirect_uri.into(), ..Self::default() }
    }
}

/// Options for opening a web client already signed in as the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthenticatedUrlOptions {
    /// Client id of the web application.
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Text and policy of the platform biometric prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricOptions {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub negative_button_text: String,
    pub allowed_authenticators: Vec<BiometricAuthenticator>,
    /// Whether enrolling a new fingerprint or face invalidates the key.
    pub invalidated_by_biometric_enrollment: bool,
}

impl Default for BiometricOptions {
    fn default() -> Self {
        Self {
            title: "Biometric Authentication".to_string(),
            subtitle: String::new(),
            description: String::new(),
            negative_button_text: "Cancel".to_string(),
            allowed_authenticators: vec![BiometricAuthenticator::BiometricStrong],
            invalidated_by_biometric_enrollment: true,
        }
    }
}

/// Options for requesting authentication from another app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App2AppAuthenticateOptions {
    /// The other app's app2app authorization URI.
    pub authorization_endpoint: String,
    /// Where the other app sends the code back to this app.
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Outcome of an interactive flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateResult {
    pub user_info: UserInfo,
    /// The `state` passed in the options, echoed back.
    pub state: Option<String>,
}
