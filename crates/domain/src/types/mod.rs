//! Domain types and models

pub mod app2app;
pub mod jwt;
pub mod oidc;
pub mod options;
pub mod session;
pub mod user_info;

pub use app2app::App2AppAuthenticateRequest;
pub use jwt::{Jwk, JwtAction, JwtHeader, JwtHeaderType, JwtPayload};
pub use oidc::{
    ApiResult, AppSessionTokenResponse, ChallengeResponse, GrantType, OidcConfiguration,
    TokenRequest, TokenResponse, TokenType,
};
pub use options::{
    App2AppAuthenticateOptions, AuthenticateOptions, AuthenticateResult, AuthenticationPage,
    BiometricAuthenticator, BiometricOptions, ColorScheme, PreAuthenticatedUrlOptions,
    PromoteOptions, PromptOption, ReauthenticateOptions, SettingsAction, SettingsActionOptions,
};
pub use session::{SessionState, SessionStateChange, SessionStateChangeReason};
pub use user_info::UserInfo;
