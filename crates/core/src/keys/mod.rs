//! Device keys bound to a namespace
//!
//! Each purpose owns at most one keypair per namespace. Only the key id is
//! persisted; the keypair itself lives in the [`KeyStore`] under
//! `com.authgear.keys.{purpose}.{kid}`.

pub mod app2app;
pub mod dpop;
pub mod ports;

use std::sync::Arc;

use authgear_domain::constants::KEY_ALIAS_PREFIX;
use authgear_domain::{JwtHeaderType, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub use app2app::App2AppKeyManager;
pub use dpop::{DPoPKeyManager, DPoPProvider};
pub use ports::{KeyPairHandle, KeyProtection, KeyStore, SignAuthorization};

use crate::storage::{SessionStorage, StorageKey};

/// What a device key is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    Anonymous,
    Biometric,
    App2App,
    DPoP,
}

impl KeyPurpose {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Biometric => "biometric",
            Self::App2App => "app2app",
            Self::DPoP => "dpop",
        }
    }

    /// Keystore alias of the key with id `kid`.
    pub fn alias(self, kid: &str) -> String {
        format!("{KEY_ALIAS_PREFIX}.{}.{kid}", self.as_str())
    }

    /// Where the key id is persisted.
    pub const fn storage_key(self) -> StorageKey {
        match self {
            Self::Anonymous => StorageKey::AnonymousKeyId,
            Self::Biometric => StorageKey::BiometricKeyId,
            Self::App2App => StorageKey::App2AppDeviceKeyId,
            Self::DPoP => StorageKey::DPoPKeyId,
        }
    }

    /// `typ` of the JWTs this key signs.
    pub const fn header_type(self) -> JwtHeaderType {
        match self {
            Self::Anonymous => JwtHeaderType::Anonymous,
            Self::Biometric => JwtHeaderType::Biometric,
            Self::App2App => JwtHeaderType::App2App,
            Self::DPoP => JwtHeaderType::DPoP,
        }
    }
}

/// A key id together with its keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceKey {
    pub kid: String,
    pub handle: KeyPairHandle,
}

/// Lifecycle of the single key of one purpose: `NoKey -> HasKey(kid)`
///
/// A persisted id whose keypair is gone from the keystore counts as `NoKey`.
pub struct DeviceKeyManager {
    purpose: KeyPurpose,
    keystore: Arc<dyn KeyStore>,
    storage: SessionStorage,
    lock: Mutex<()>,
}

impl DeviceKeyManager {
    pub fn new(purpose: KeyPurpose, keystore: Arc<dyn KeyStore>, storage: SessionStorage) -> Self {
        Self { purpose, keystore, storage, lock: Mutex::new(()) }
    }

    pub const fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    pub fn keystore(&self) -> &dyn KeyStore {
        self.keystore.as_ref()
    }

    /// The persisted key id, whether or not its keypair still exists.
    pub async fn stored_kid(&self) -> Result<Option<String>> {
        self.storage.get(self.purpose.storage_key()).await
    }

    /// The persisted key, if both the id and the keypair exist.
    ///
    /// A keypair the keystore reports as damaged is deleted and treated as
    /// missing.
    pub async fn existing_key(&self) -> Result<Option<DeviceKey>> {
        let Some(kid) = self.stored_kid().await? else {
            return Ok(None);
        };
        let alias = self.purpose.alias(&kid);
        let handle = match self.keystore.get_key_pair(&alias).await {
            Ok(handle) => handle,
            Err(err) if err.corruption_kind().is_some() => {
                warn!(purpose = self.purpose.as_str(), kid = %kid, error = %err, "Device key damaged");
                self.keystore.delete_key_pair(&alias).await?;
                None
            }
            Err(err) => return Err(err),
        };
        Ok(handle.map(|handle| DeviceKey { kid, handle }))
    }

    /// A fresh key under a new UUID id. The id is not persisted.
    pub async fn create_key(&self, protection: KeyProtection) -> Result<DeviceKey> {
        let kid = Uuid::new_v4().to_string();
        let handle = self.keystore.generate_key_pair(&self.purpose.alias(&kid), protection).await?;
        debug!(purpose = self.purpose.as_str(), kid = %kid, "Generated device key");
        Ok(DeviceKey { kid, handle })
    }

    /// Reuse the persisted key, or create one without persisting its id.
    ///
    /// Returns whether the key is new so the caller can persist it once the
    /// server accepted it.
    pub async fn prepare_key(&self, protection: KeyProtection) -> Result<(DeviceKey, bool)> {
        if let Some(key) = self.existing_key().await? {
            return Ok((key, false));
        }
        Ok((self.create_key(protection).await?, true))
    }

    /// Reuse or create the key and persist its id.
    ///
    /// Calls are serialized per manager.
    pub async fn ensure_key(&self, force_new: bool, protection: KeyProtection) -> Result<DeviceKey> {
        let _guard = self.lock.lock().await;
        if force_new {
            if let Some(old) = self.stored_kid().await? {
                self.keystore.delete_key_pair(&self.purpose.alias(&old)).await?;
            }
        } else if let Some(key) = self.existing_key().await? {
            return Ok(key);
        }
        let key = self.create_key(protection).await?;
        self.persist(&key.kid).await?;
        Ok(key)
    }

    pub async fn persist(&self, kid: &str) -> Result<()> {
        self.storage.set(self.purpose.storage_key(), kid).await
    }

    /// Forget the key id and delete the keypair. Idempotent.
    pub async fn delete_key(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(kid) = self.stored_kid().await? {
            self.keystore.delete_key_pair(&self.purpose.alias(&kid)).await?;
        }
        self.storage.delete(self.purpose.storage_key()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_session_storage, FakeKeyStore};

    fn manager(keystore: Arc<FakeKeyStore>) -> DeviceKeyManager {
        DeviceKeyManager::new(KeyPurpose::Anonymous, keystore, memory_session_storage("ns"))
    }

    /// Validates `KeyPurpose::alias` behavior for the alias convention
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms aliases follow `com.authgear.keys.{purpose}.{kid}`.
    #[test]
    fn test_alias_convention() {
        assert_eq!(KeyPurpose::DPoP.alias("k1"), "com.authgear.keys.dpop.k1");
        assert_eq!(KeyPurpose::App2App.alias("k2"), "com.authgear.keys.app2app.k2");
    }

    /// Validates `DeviceKeyManager::ensure_key` behavior for the reuse
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a second call returns the same kid.
    /// - Confirms `force_new` rotates the kid.
    #[tokio::test]
    async fn test_ensure_key_reuses_and_rotates() {
        let keys = manager(Arc::new(FakeKeyStore::new()));
        let first = keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap();
        let again = keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap();
        assert_eq!(first.kid, again.kid);

        let rotated = keys.ensure_key(true, KeyProtection::Unprotected).await.unwrap();
        assert_ne!(first.kid, rotated.kid);
        assert_eq!(keys.stored_kid().await.unwrap(), Some(rotated.kid));
    }

    /// Validates `DeviceKeyManager::ensure_key` behavior for the damaged
    /// keypair scenario.
    ///
    /// Assertions:
    /// - Confirms a damaged keypair is replaced instead of failing.
    /// - Ensures the new kid is persisted and the damaged alias removed.
    #[tokio::test]
    async fn test_ensure_key_replaces_damaged_key() {
        let keystore = Arc::new(FakeKeyStore::new());
        let keys = manager(keystore.clone());
        let first = keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap();
        keystore.corrupt(&first.handle.alias);

        let replaced = keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap();
        assert_ne!(replaced.kid, first.kid);
        assert_eq!(keys.stored_kid().await.unwrap(), Some(replaced.kid.clone()));
        assert!(!keystore.contains(&first.handle.alias));
        assert_eq!(keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap(), replaced);
    }

    /// Validates `DeviceKeyManager::ensure_key` behavior for the lost keypair
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a kid whose keypair was deleted is silently replaced.
    /// - Confirms the new kid is persisted.
    #[tokio::test]
    async fn test_ensure_key_regenerates_when_keypair_lost() {
        let keystore = Arc::new(FakeKeyStore::new());
        let keys = manager(keystore.clone());
        let first = keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap();

        keystore.delete_key_pair(&first.handle.alias).await.unwrap();

        let second = keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap();
        assert_ne!(first.kid, second.kid);
        assert_eq!(keys.stored_kid().await.unwrap(), Some(second.kid));
    }

    /// Validates `DeviceKeyManager::prepare_key` behavior for the deferred
    /// persistence scenario.
    ///
    /// Assertions:
    /// - Ensures a new key is reported as new and not persisted.
    /// - Confirms the persisted key is reused afterwards.
    #[tokio::test]
    async fn test_prepare_key_defers_persistence() {
        let keys = manager(Arc::new(FakeKeyStore::new()));
        let (key, is_new) = keys.prepare_key(KeyProtection::Unprotected).await.unwrap();
        assert!(is_new);
        assert!(keys.stored_kid().await.unwrap().is_none());

        keys.persist(&key.kid).await.unwrap();
        let (reused, is_new) = keys.prepare_key(KeyProtection::Unprotected).await.unwrap();
        assert!(!is_new);
        assert_eq!(reused.kid, key.kid);
    }

    /// Validates `DeviceKeyManager::delete_key` behavior for the cleanup
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures both the kid and the keypair are gone.
    /// - Ensures deleting again is not an error.
    #[tokio::test]
    async fn test_delete_key_is_idempotent() {
        let keystore = Arc::new(FakeKeyStore::new());
        let keys = manager(keystore.clone());
        let key = keys.ensure_key(false, KeyProtection::Unprotected).await.unwrap();

        keys.delete_key().await.unwrap();
        assert!(keys.stored_kid().await.unwrap().is_none());
        assert!(keystore.get_key_pair(&key.handle.alias).await.unwrap().is_none());
        keys.delete_key().await.unwrap();
    }
}
