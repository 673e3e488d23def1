//! JWK conversion and RFC 7638 thumbprints

use authgear_domain::constants::JWK_KTY_RSA;
use authgear_domain::Jwk;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::keys::KeyPairHandle;

/// Public JWK of a keystore keypair, identified by `kid`.
#[must_use]
pub fn jwk_from_handle(kid: &str, handle: &KeyPairHandle) -> Jwk {
    Jwk::rsa(
        kid,
        URL_SAFE_NO_PAD.encode(strip_leading_zeros(&handle.modulus)),
        URL_SAFE_NO_PAD.encode(strip_leading_zeros(&handle.exponent)),
    )
}

/// base64url(SHA-256) of the canonical `{"e","kty","n"}` member set.
///
/// Used as `dpop_jkt` in authorization requests.
#[must_use]
pub fn thumbprint(jwk: &Jwk) -> String {
    // base64url values never need JSON escaping.
    let canonical = format!(r#"{{"e":"{}","kty":"{}","n":"{}"}}"#, jwk.e, JWK_KTY_RSA, jwk.n);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len().saturating_sub(1));
    &bytes[first..]
}
