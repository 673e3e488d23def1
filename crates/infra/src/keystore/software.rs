//! RSA keys held in process memory
//!
//! Stands in for a hardware keystore on desktop and server targets. With
//! persistence enabled, each private key is written as a base64 PKCS#8 DER
//! blob into a [`SecureStorage`] namespace so it survives a restart.
//! Protection is enforced in software: a user-authenticated key refuses to
//! sign without [`SignAuthorization::UserVerified`]. A blob that no longer
//! decodes is discarded, so the key counts as lost and is regenerated.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use authgear_core::{KeyPairHandle, KeyProtection, KeyStore, SecureStorage, SignAuthorization};
use authgear_domain::constants::RSA_KEY_BITS;
use authgear_domain::{AuthgearError, BiometricError, CorruptionKind, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::InfraError;

#[derive(Clone)]
struct StoredKey {
    private: Arc<RsaPrivateKey>,
    protection: KeyProtection,
}

impl StoredKey {
    fn handle(&self, alias: &str) -> KeyPairHandle {
        KeyPairHandle {
            alias: alias.to_string(),
            modulus: self.private.n().to_bytes_be(),
            exponent: self.private.e().to_bytes_be(),
            protection: self.protection,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedKey {
    der: String,
    user_authentication: bool,
    #[serde(default)]
    invalidated_by_enrollment: bool,
}

struct Persistence {
    storage: Arc<dyn SecureStorage>,
    namespace: String,
}

/// Software [`KeyStore`]
pub struct SoftwareKeyStore {
    keys: RwLock<HashMap<String, StoredKey>>,
    persistence: Option<Persistence>,
}

impl Default for SoftwareKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareKeyStore {
    /// Keys live only as long as this value.
    pub fn new() -> Self {
        Self { keys: RwLock::new(HashMap::new()), persistence: None }
    }

    /// Keys are also written to `namespace` of `storage`.
    pub fn persistent(storage: Arc<dyn SecureStorage>, namespace: impl Into<String>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            persistence: Some(Persistence { storage, namespace: namespace.into() }),
        }
    }

    async fn lookup(&self, alias: &str) -> Result<Option<StoredKey>> {
        if let Some(key) = self.keys.read().get(alias).cloned() {
            return Ok(Some(key));
        }
        let Some(persistence) = &self.persistence else {
            return Ok(None);
        };
        let Some(raw) = persistence.storage.get(&persistence.namespace, alias).await? else {
            return Ok(None);
        };
        let key = match decode_key(&raw) {
            Ok(key) => key,
            Err(err) => {
                warn!(alias, error = %err, "Discarding undecodable stored key");
                persistence.storage.delete(&persistence.namespace, alias).await?;
                return Ok(None);
            }
        };
        self.keys.write().insert(alias.to_string(), key.clone());
        Ok(Some(key))
    }
}

#[async_trait]
impl KeyStore for SoftwareKeyStore {
    async fn generate_key_pair(
        &self,
        alias: &str,
        protection: KeyProtection,
    ) -> Result<KeyPairHandle> {
        let private = tokio::task::spawn_blocking(|| RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS))
            .await
            .map_err(|e| AuthgearError::Internal(format!("key generation task failed: {e}")))?
            .map_err(InfraError::from)?;
        let key = StoredKey { private: Arc::new(private), protection };

        if let Some(persistence) = &self.persistence {
            let encoded = encode_key(&key)?;
            persistence.storage.set(&persistence.namespace, alias, &encoded).await?;
        }
        debug!(alias, "Generated RSA keypair");
        let handle = key.handle(alias);
        self.keys.write().insert(alias.to_string(), key);
        Ok(handle)
    }

    async fn get_key_pair(&self, alias: &str) -> Result<Option<KeyPairHandle>> {
        Ok(self.lookup(alias).await?.map(|key| key.handle(alias)))
    }

    async fn delete_key_pair(&self, alias: &str) -> Result<()> {
        self.keys.write().remove(alias);
        if let Some(persistence) = &self.persistence {
            persistence.storage.delete(&persistence.namespace, alias).await?;
        }
        Ok(())
    }

    async fn sign(
        &self,
        handle: &KeyPairHandle,
        data: &[u8],
        authorization: SignAuthorization,
    ) -> Result<Vec<u8>> {
        let key = self
            .lookup(&handle.alias)
            .await?
            .ok_or_else(|| AuthgearError::KeyStore(format!("no keypair for {}", handle.alias)))?;
        if key.protection.requires_user_authentication()
            && authorization != SignAuthorization::UserVerified
        {
            return Err(AuthgearError::Biometric(BiometricError::AuthenticationRequired));
        }
        let digest = Sha256::digest(data);
        Ok(key
            .private
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(InfraError::from)?)
    }
}

fn encode_key(key: &StoredKey) -> Result<String> {
    let der = key
        .private
        .to_pkcs8_der()
        .map_err(|e| AuthgearError::KeyStore(format!("failed to encode private key: {e}")))?;
    let (user_authentication, invalidated_by_enrollment) = match key.protection {
        KeyProtection::Unprotected => (false, false),
        KeyProtection::UserAuthentication { invalidated_by_enrollment } => {
            (true, invalidated_by_enrollment)
        }
    };
    let persisted = PersistedKey {
        der: BASE64.encode(der.as_bytes()),
        user_authentication,
        invalidated_by_enrollment,
    };
    serde_json::to_string(&persisted)
        .map_err(|e| AuthgearError::KeyStore(format!("failed to serialize private key: {e}")))
}

fn decode_key(raw: &str) -> Result<StoredKey> {
    let malformed = |message: String| AuthgearError::StorageCorrupted {
        kind: CorruptionKind::MalformedEncoding,
        message,
    };
    let persisted: PersistedKey =
        serde_json::from_str(raw).map_err(|e| malformed(format!("stored key: {e}")))?;
    let der = BASE64.decode(&persisted.der).map_err(|e| malformed(format!("stored key: {e}")))?;
    let private =
        RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| malformed(format!("stored key: {e}")))?;
    let protection = if persisted.user_authentication {
        KeyProtection::UserAuthentication {
            invalidated_by_enrollment: persisted.invalidated_by_enrollment,
        }
    } else {
        KeyProtection::Unprotected
    };
    Ok(StoredKey { private: Arc::new(private), protection })
}
