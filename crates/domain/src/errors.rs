//! Error types used throughout the SDK

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by the authorization server in the standard OAuth shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthError {
    pub error: String,
    pub error_description: Option<String>,
    pub state: Option<String>,
    pub error_uri: Option<String>,
}

impl OAuthError {
    /// Build an OAuth error with only `error` and `error_description` set.
    pub fn new(error: impl Into<String>, description: Option<String>) -> Self {
        Self { error: error.into(), error_description: description, state: None, error_uri: None }
    }
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Structured Authgear application error (`{"error": {"name", "reason", ...}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub name: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.reason, self.message)
    }
}

/// Failures reported by the platform biometric prompt or a protected key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiometricError {
    /// The prompt was dismissed by the system.
    Cancel,
    /// The user pressed the negative button.
    NegativeButton,
    /// The user dismissed the prompt.
    UserCanceled,
    /// Too many failed attempts, temporarily locked.
    Lockout,
    /// Too many failed attempts, locked until the device credential is used.
    LockoutPermanent,
    /// No biometric hardware.
    NoHardware,
    /// Hardware present but unavailable.
    HardwareUnavailable,
    /// No biometrics enrolled.
    NotEnrolled,
    /// The key requires user authentication and none was performed.
    AuthenticationRequired,
    /// Biometric authentication is not supported on this platform.
    Unsupported,
    /// Any other platform error code.
    Other { code: i32, message: String },
}

impl BiometricError {
    /// Whether the error is one of the user-initiated cancel variants.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel | Self::NegativeButton | Self::UserCanceled)
    }
}

impl fmt::Display for BiometricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => write!(f, "biometric prompt canceled"),
            Self::NegativeButton => write!(f, "biometric prompt negative button pressed"),
            Self::UserCanceled => write!(f, "biometric prompt canceled by user"),
            Self::Lockout => write!(f, "biometric lockout"),
            Self::LockoutPermanent => write!(f, "biometric lockout (permanent)"),
            Self::NoHardware => write!(f, "no biometric hardware"),
            Self::HardwareUnavailable => write!(f, "biometric hardware unavailable"),
            Self::NotEnrolled => write!(f, "no biometrics enrolled"),
            Self::AuthenticationRequired => write!(f, "user authentication required"),
            Self::Unsupported => write!(f, "biometric authentication unsupported"),
            Self::Other { code, message } => write!(f, "biometric error {code}: {message}"),
        }
    }
}

/// The recoverable ways an encrypted store can be damaged by backup/restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorruptionKind {
    /// The persisted container could not be decoded.
    MalformedEncoding,
    /// The container decoded but could not be decrypted or authenticated.
    Cryptographic,
    /// The backing file could not be read or written.
    Io,
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEncoding => write!(f, "malformed encoding"),
            Self::Cryptographic => write!(f, "cryptographic failure"),
            Self::Io => write!(f, "i/o failure"),
        }
    }
}

/// Main error type for the SDK
///
/// `Clone` so that one single-flight refresh outcome can be handed to every
/// waiter.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum AuthgearError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("OAuth error: {0}")]
    OAuth(OAuthError),

    #[error("Server error: {0}")]
    Server(ServerError),

    #[error("Unexpected response (status {status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed JWT: {0}")]
    MalformedJwt(String),

    #[error("Biometric error: {0}")]
    Biometric(BiometricError),

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage corrupted ({kind}): {message}")]
    StorageCorrupted { kind: CorruptionKind, message: String },

    #[error("Authgear is not configured; call configure() first")]
    NotConfigured,

    #[error("No authenticated session")]
    Unauthenticated,

    #[error("Anonymous user credentials not found")]
    AnonymousUserNotFound,

    #[error("Biometric private key not found")]
    BiometricPrivateKeyNotFound,

    #[error("Pre-authenticated URL is not allowed: insufficient scope")]
    PreAuthenticatedUrlInsufficientScope,

    #[error("Pre-authenticated URL is not allowed: ID token not found")]
    PreAuthenticatedUrlIdTokenNotFound,

    #[error("Pre-authenticated URL is not allowed: device secret not found")]
    PreAuthenticatedUrlDeviceSecretNotFound,

    #[error("No pending interaction for token {0}")]
    InteractionNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthgearError {
    /// Shorthand for an [`AuthgearError::OAuth`] carrying `error` and a description.
    pub fn oauth(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth(OAuthError::new(error, Some(description.into())))
    }

    /// Whether the caller should treat this as a silent no-op.
    pub fn is_cancel(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Biometric(err) => err.is_cancel(),
            _ => false,
        }
    }

    /// Whether the server rejected the grant (expired or revoked refresh token).
    pub fn is_invalid_grant(&self) -> bool {
        match self {
            Self::OAuth(err) => err.error == "invalid_grant",
            Self::Server(err) => err.name == "InvalidGrant",
            _ => false,
        }
    }

    /// Whether this is one of the storage corruption kinds that recovery handles.
    pub fn corruption_kind(&self) -> Option<CorruptionKind> {
        match self {
            Self::StorageCorrupted { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, AuthgearError>;
