//! JWT and JWK structures used for device-bound grants and DPoP proofs

use serde::{Deserialize, Serialize};

use crate::constants::{JWK_ALG_RS256, JWK_KTY_RSA, JWT_VALIDITY_SECONDS};

/// RSA public key in JWK form. `n` and `e` are base64url of the unsigned
/// big-endian integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kid: String,
    pub alg: String,
    pub kty: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// An RS256 RSA key.
    pub fn rsa(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            alg: JWK_ALG_RS256.to_string(),
            kty: JWK_KTY_RSA.to_string(),
            n: n.into(),
            e: e.into(),
        }
    }
}

/// Registered `typ` header values, one per proof purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JwtHeaderType {
    #[serde(rename = "vnd.authgear.anonymous-request")]
    Anonymous,
    #[serde(rename = "vnd.authgear.biometric-request")]
    Biometric,
    #[serde(rename = "vnd.authgear.app2app-request")]
    App2App,
    #[serde(rename = "dpop+jwt")]
    DPoP,
}

impl JwtHeaderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "vnd.authgear.anonymous-request",
            Self::Biometric => "vnd.authgear.biometric-request",
            Self::App2App => "vnd.authgear.app2app-request",
            Self::DPoP => "dpop+jwt",
        }
    }
}

/// JOSE header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub typ: JwtHeaderType,
    pub kid: String,
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
}

/// The `action` claim of device-key proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JwtAction {
    /// Sign in as an existing anonymous user.
    Auth,
    /// Promote an anonymous user to a regular one.
    Promote,
    /// Register a device key with the current session.
    Setup,
    /// Sign in with a biometric key.
    Authenticate,
}

/// JWT claims. Optional claims are omitted from the JSON when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtPayload {
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<JwtAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<serde_json::Value>,
}

impl JwtPayload {
    /// Payload issued at `now` (unix seconds) with the fixed 60 second window.
    pub const fn issued_at(now: i64) -> Self {
        Self {
            iat: now,
            exp: now + JWT_VALIDITY_SECONDS,
            jti: None,
            htm: None,
            htu: None,
            challenge: None,
            action: None,
            device_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_type_serializes_to_registered_value() {
        assert_eq!(serde_json::to_string(&JwtHeaderType::DPoP).unwrap(), "\"dpop+jwt\"");
        assert_eq!(
            serde_json::to_string(&JwtHeaderType::App2App).unwrap(),
            format!("\"{}\"", JwtHeaderType::App2App.as_str())
        );
    }

    #[test]
    fn test_payload_omits_unset_claims() {
        let payload = JwtPayload { action: Some(JwtAction::Setup), ..JwtPayload::issued_at(100) };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["iat"], 100);
        assert_eq!(json["exp"], 160);
        assert_eq!(json["action"], "setup");
        assert!(json.get("jti").is_none());
        assert!(json.get("challenge").is_none());
    }
}
