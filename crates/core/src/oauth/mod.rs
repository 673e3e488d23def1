//! Authorization server port and authorization request building

pub mod authorization;
pub mod ports;

pub use authorization::{login_hint, parse_redirect, AuthorizationRequest, AuthorizationResponse};
pub use ports::OAuthProvider;
