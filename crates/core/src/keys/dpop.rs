//! DPoP (RFC 9449) proof-of-possession key

use std::sync::Arc;

use async_trait::async_trait;
use authgear_domain::{JwtPayload, Result};
use chrono::Utc;
use uuid::Uuid;

use super::{DeviceKeyManager, KeyProtection, KeyPurpose, KeyStore, SignAuthorization};
use crate::jwk::{jwk_from_handle, thumbprint};
use crate::jwt;
use crate::storage::SessionStorage;

/// Source of `DPoP` headers for outgoing requests
#[async_trait]
pub trait DPoPProvider: Send + Sync {
    /// Proof JWT for one request. A fresh `jti` on every call.
    async fn proof(&self, htm: &str, htu: &str) -> Result<String>;

    /// JWK thumbprint of the proof key, sent as `dpop_jkt`.
    async fn thumbprint(&self) -> Result<String>;
}

/// The long-lived DPoP key of a namespace
///
/// The key id lives in the inter-app shared store, so apps sharing a session
/// also share its DPoP binding.
pub struct DPoPKeyManager {
    keys: DeviceKeyManager,
}

impl DPoPKeyManager {
    pub fn new(keystore: Arc<dyn KeyStore>, storage: SessionStorage) -> Self {
        Self { keys: DeviceKeyManager::new(KeyPurpose::DPoP, keystore, storage) }
    }

    pub async fn delete_key(&self) -> Result<()> {
        self.keys.delete_key().await
    }
}

#[async_trait]
impl DPoPProvider for DPoPKeyManager {
    async fn proof(&self, htm: &str, htu: &str) -> Result<String> {
        let key = self.keys.ensure_key(false, KeyProtection::Unprotected).await?;
        let payload = JwtPayload {
            jti: Some(Uuid::new_v4().to_string()),
            htm: Some(htm.to_string()),
            htu: Some(htu.to_string()),
            ..JwtPayload::issued_at(Utc::now().timestamp())
        };
        jwt::sign(
            self.keys.keystore(),
            KeyPurpose::DPoP.header_type(),
            &key,
            &payload,
            SignAuthorization::Unattended,
        )
        .await
    }

    async fn thumbprint(&self) -> Result<String> {
        let key = self.keys.ensure_key(false, KeyProtection::Unprotected).await?;
        Ok(thumbprint(&jwk_from_handle(&key.kid, &key.handle)))
    }
}
