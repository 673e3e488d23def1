//! SDK constants
//!
//! Centralized location for protocol strings and fixed values shared by the
//! core and infrastructure layers.

// OAuth / OIDC
pub const CODE_CHALLENGE_METHOD: &str = "S256";
pub const DEFAULT_SCOPES: [&str; 3] =
    ["openid", "offline_access", "https://authgear.com/scopes/full-access"];
pub const SETTINGS_ACTION_SCOPES: [&str; 2] = ["openid", "https://authgear.com/scopes/full-access"];
pub const PRE_AUTHENTICATED_URL_SCOPE: &str = "https://authgear.com/scopes/pre-authenticated-url";
pub const RESPONSE_TYPE_CODE: &str = "code";
pub const RESPONSE_TYPE_NONE: &str = "none";
pub const RESPONSE_TYPE_SETTINGS_ACTION: &str =
    "urn:authgear:params:oauth:response-type:settings-action";
pub const RESPONSE_TYPE_PRE_AUTHENTICATED_URL: &str =
    "urn:authgear:params:oauth:response-type:pre-authenticated-url token";
pub const WELL_KNOWN_OPENID_CONFIGURATION: &str = "/.well-known/openid-configuration";
pub const CHALLENGE_PATH: &str = "/oauth2/challenge";
pub const APP_SESSION_TOKEN_PATH: &str = "/oauth2/app_session_token";
pub const WECHAT_CALLBACK_PATH: &str = "/sso/wechat/callback";

// Login hints
pub const LOGIN_HINT_BASE: &str = "https://authgear.com/login_hint";

// Claims
pub const CLAIM_IS_VERIFIED: &str = "https://authgear.com/claims/user/is_verified";
pub const CLAIM_IS_ANONYMOUS: &str = "https://authgear.com/claims/user/is_anonymous";
pub const CLAIM_CAN_REAUTHENTICATE: &str = "https://authgear.com/claims/user/can_reauthenticate";
pub const CLAIM_AUTH_TIME: &str = "auth_time";
pub const CLAIM_SCOPE: &str = "scope";

// Challenge purposes
pub const CHALLENGE_PURPOSE_ANONYMOUS: &str = "anonymous_request";
pub const CHALLENGE_PURPOSE_BIOMETRIC: &str = "biometric_request";
pub const CHALLENGE_PURPOSE_APP2APP: &str = "app2app_request";

// Timing
/// Lifetime of every proof JWT. Server-side replay tolerance depends on it.
pub const JWT_VALIDITY_SECONDS: i64 = 60;
/// Cached access tokens are treated as expired this long before `expires_in`.
pub const ACCESS_TOKEN_SKEW_SECONDS: i64 = 30;

// Keys
pub const KEY_ALIAS_PREFIX: &str = "com.authgear.keys";
pub const JWK_ALG_RS256: &str = "RS256";
pub const JWK_KTY_RSA: &str = "RSA";
pub const RSA_KEY_BITS: usize = 2048;

// Defaults
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_PLATFORM: &str = "rust";
