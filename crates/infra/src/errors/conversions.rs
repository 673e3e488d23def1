//! Conversions from external infrastructure errors into domain errors.

use authgear_domain::{AuthgearError, CorruptionKind};
use keyring::Error as KeyringError;
use reqwest::Error as HttpError;
use rsa::Error as RsaError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub AuthgearError);

impl From<InfraError> for AuthgearError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<AuthgearError> for InfraError {
    fn from(value: AuthgearError) -> Self {
        Self(value)
    }
}

trait IntoAuthgearError {
    fn into_authgear(self) -> AuthgearError;
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → AuthgearError */
/* -------------------------------------------------------------------------- */

impl IntoAuthgearError for KeyringError {
    fn into_authgear(self) -> AuthgearError {
        let description = self.to_string();

        match self {
            Self::NoEntry => AuthgearError::Storage("keychain entry not found".into()),
            Self::BadEncoding(_) => AuthgearError::StorageCorrupted {
                kind: CorruptionKind::MalformedEncoding,
                message: "credential in keychain is not valid UTF-8".into(),
            },
            Self::TooLong(name, limit) => AuthgearError::Storage(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Self::Invalid(attr, reason) => {
                AuthgearError::Storage(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            Self::PlatformFailure(err) => {
                AuthgearError::Storage(format!("keychain platform error: {err}"))
            }
            Self::NoStorageAccess(err) => {
                AuthgearError::Storage(format!("unable to access secure storage: {err}"))
            }
            _ => AuthgearError::Storage(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        Self(value.into_authgear())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → AuthgearError */
/* -------------------------------------------------------------------------- */

impl IntoAuthgearError for HttpError {
    fn into_authgear(self) -> AuthgearError {
        if self.is_timeout() {
            return AuthgearError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return AuthgearError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return AuthgearError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if self.is_decode() {
            return AuthgearError::UnexpectedResponse {
                status: self.status().map_or(0, |s| s.as_u16()),
                body: self.to_string(),
            };
        }

        AuthgearError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_authgear())
    }
}

/* -------------------------------------------------------------------------- */
/* rsa::Error → AuthgearError */
/* -------------------------------------------------------------------------- */

impl IntoAuthgearError for RsaError {
    fn into_authgear(self) -> AuthgearError {
        AuthgearError::KeyStore(format!("RSA operation failed: {self}"))
    }
}

impl From<RsaError> for InfraError {
    fn from(value: RsaError) -> Self {
        Self(value.into_authgear())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
