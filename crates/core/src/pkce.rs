//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 with the `S256` method only. A fresh pair is created
//! for every authorization attempt.

use authgear_domain::constants::CODE_CHALLENGE_METHOD;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure code verifier
///
/// Returns a URL-safe base64-encoded random string of 32 bytes (43 characters).
#[must_use]
pub fn generate_code_verifier() -> String {
    random_token()
}

/// Generate code challenge from verifier using SHA256
///
/// Per RFC 7636, the challenge is BASE64URL(SHA256(ASCII(code_verifier)))
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random opaque state value
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    // `OsRng`-seeded thread RNG; failure to seed aborts the process.
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE verifier/challenge pair for one authorization round trip
///
/// The verifier is persisted until the code exchange and never sent in the
/// authorization URL.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Random string (43 chars, base64url encoded)
    pub verifier: String,

    /// SHA256 hash of verifier (base64url encoded)
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new pair with cryptographically secure random values
    ///
    /// # Examples
    /// ```
    /// use authgear_core::pkce::PkceChallenge;
    ///
    /// let pkce = PkceChallenge::generate();
    /// assert_eq!(pkce.verifier.len(), 43);
    /// assert_eq!(pkce.method(), "S256");
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);
        Self { verifier, challenge }
    }

    /// Rebuild a pair from a persisted verifier
    #[must_use]
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = generate_code_challenge(&verifier);
        Self { verifier, challenge }
    }

    /// Get the challenge method (always "S256" for SHA256)
    #[must_use]
    pub const fn method(&self) -> &'static str {
        CODE_CHALLENGE_METHOD
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}
