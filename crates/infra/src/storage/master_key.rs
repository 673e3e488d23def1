//! Encryption key management using system keyring
use authgear_domain::{AuthgearError, Result};
use keyring::Entry;
use rand::RngCore;
use tracing::warn;

use crate::errors::InfraError;

const DEFAULT_SERVICE: &str = "com.authgear.sdk";
const DEFAULT_ACCOUNT: &str = "storage_master_key";

/// The 32-byte key of the encrypted file stores, kept in the OS keyring
pub struct KeyringMasterKey {
    service: String,
    account: String,
}

impl Default for KeyringMasterKey {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE, DEFAULT_ACCOUNT)
    }
}

impl KeyringMasterKey {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service: service.into(), account: account.into() }
    }

    fn entry(&self) -> Result<Entry> {
        Ok(Entry::new(&self.service, &self.account).map_err(InfraError::from)?)
    }

    /// Get or create the master key.
    ///
    /// A stored value that is not 32 hex-encoded bytes is replaced. Stores
    /// encrypted with the lost key then fail to decrypt and are recreated.
    ///
    /// # Errors
    /// Keyring access failures.
    pub fn get_or_create(&self) -> Result<[u8; 32]> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(stored) => match decode_key(&stored) {
                Some(key) => return Ok(key),
                None => warn!(service = %self.service, "Master key in keyring is invalid, replacing"),
            },
            Err(keyring::Error::NoEntry) => {}
            Err(err) => return Err(InfraError::from(err).into()),
        }

        let key = generate_key();
        entry.set_password(&hex::encode(key)).map_err(InfraError::from)?;
        Ok(key)
    }

    /// Delete the stored master key. Idempotent.
    ///
    /// # Errors
    /// Keyring access failures.
    pub fn delete(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(InfraError::from(err).into()),
        }
    }
}

/// Generate a new random 32-byte encryption key.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn decode_key(stored: &str) -> Option<[u8; 32]> {
    hex::decode(stored).ok()?.try_into().ok()
}

/// Parse a hex-encoded master key, e.g. from an environment variable.
///
/// # Errors
/// `Config` unless the value is exactly 32 hex-encoded bytes.
pub fn parse_hex_key(value: &str) -> Result<[u8; 32]> {
    decode_key(value.trim())
        .ok_or_else(|| AuthgearError::Config("master key must be 64 hex characters".to_string()))
}
