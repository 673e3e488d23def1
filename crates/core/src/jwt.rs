//! Compact JWT encoding for device-key proofs
//!
//! Tokens are signed with RS256 through the [`KeyStore`] port. Decoding only
//! reads the payload; signatures issued by the server are never verified
//! here.

use authgear_domain::constants::JWK_ALG_RS256;
use authgear_domain::{AuthgearError, JwtHeader, JwtHeaderType, JwtPayload, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::jwk::jwk_from_handle;
use crate::keys::{DeviceKey, KeyStore, SignAuthorization};

/// Header for a proof signed by `key`, with its public JWK embedded.
#[must_use]
pub fn header_for(typ: JwtHeaderType, key: &DeviceKey) -> JwtHeader {
    JwtHeader {
        typ,
        kid: key.kid.clone(),
        alg: JWK_ALG_RS256.to_string(),
        jwk: Some(jwk_from_handle(&key.kid, &key.handle)),
    }
}

/// `b64url(header).b64url(payload)`, the RS256 signing input.
///
/// # Errors
/// Returns `AuthgearError::Internal` if either part fails to serialize.
pub fn signing_input(header: &JwtHeader, payload: &JwtPayload) -> Result<String> {
    let header = serde_json::to_vec(header)
        .map_err(|e| AuthgearError::Internal(format!("Failed to encode JWT header: {e}")))?;
    let payload = serde_json::to_vec(payload)
        .map_err(|e| AuthgearError::Internal(format!("Failed to encode JWT payload: {e}")))?;
    Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(payload)))
}

/// Sign `payload` with `key` and return the compact serialization.
///
/// # Errors
/// Propagates keystore failures, including
/// `Biometric(AuthenticationRequired)` for a protected key signed without
/// user verification.
pub async fn sign(
    keystore: &dyn KeyStore,
    typ: JwtHeaderType,
    key: &DeviceKey,
    payload: &JwtPayload,
    authorization: SignAuthorization,
) -> Result<String> {
    let input = signing_input(&header_for(typ, key), payload)?;
    let signature = keystore.sign(&key.handle, input.as_bytes(), authorization).await?;
    Ok(format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Decode the payload segment of a compact JWT into a JSON object.
///
/// # Errors
/// Returns `AuthgearError::MalformedJwt` unless the token has exactly three
/// segments and the second is base64url-encoded JSON object.
pub fn decode_payload(jwt: &str) -> Result<Map<String, Value>> {
    let segments: Vec<&str> = jwt.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthgearError::MalformedJwt(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    // Tolerate padded input from non-conforming issuers.
    let raw = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| AuthgearError::MalformedJwt(format!("payload is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AuthgearError::MalformedJwt("payload is not a JSON object".to_string())),
        Err(e) => Err(AuthgearError::MalformedJwt(format!("payload is not JSON: {e}"))),
    }
}
