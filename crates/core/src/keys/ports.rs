//! Port interfaces for device key storage
//!
//! Platform keystores (Android Keystore, Secure Enclave, TPM) and the
//! software keystore in the infra layer implement this trait.

use async_trait::async_trait;
use authgear_domain::Result;

/// Whether signing with a key requires a completed user authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyProtection {
    /// Signing never prompts.
    Unprotected,
    /// Signing requires a biometric or device-credential authentication.
    UserAuthentication {
        /// Enrolling new biometrics permanently invalidates the key.
        invalidated_by_enrollment: bool,
    },
}

impl KeyProtection {
    pub const fn requires_user_authentication(self) -> bool {
        matches!(self, Self::UserAuthentication { .. })
    }
}

/// Proof that the caller satisfied the key's protection before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignAuthorization {
    Unattended,
    /// The platform prompt succeeded for this signing operation.
    UserVerified,
}

/// Reference to an RSA keypair held by a [`KeyStore`].
///
/// Only public material leaves the keystore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairHandle {
    pub alias: String,
    /// RSA modulus, unsigned big-endian.
    pub modulus: Vec<u8>,
    /// RSA public exponent, unsigned big-endian.
    pub exponent: Vec<u8>,
    pub protection: KeyProtection,
}

/// RSA-2048 keypairs addressed by alias, signing with RS256
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Create a keypair under `alias`, replacing any existing one.
    async fn generate_key_pair(
        &self,
        alias: &str,
        protection: KeyProtection,
    ) -> Result<KeyPairHandle>;

    /// Look up an existing keypair.
    async fn get_key_pair(&self, alias: &str) -> Result<Option<KeyPairHandle>>;

    /// Remove a keypair. Removing a missing alias is not an error.
    async fn delete_key_pair(&self, alias: &str) -> Result<()>;

    /// PKCS#1 v1.5 SHA-256 signature over `data`.
    async fn sign(
        &self,
        handle: &KeyPairHandle,
        data: &[u8],
        authorization: SignAuthorization,
    ) -> Result<Vec<u8>>;
}
