//! App2app device key and its setup JWTs

use std::sync::Arc;

use authgear_domain::{JwtAction, JwtPayload, Result};
use chrono::Utc;

use super::{DeviceKeyManager, KeyProtection, KeyPurpose, KeyStore, SignAuthorization};
use crate::jwt;
use crate::storage::SessionStorage;

/// Key that binds a session to this device for app2app authorization
pub struct App2AppKeyManager {
    keys: DeviceKeyManager,
    device_info: Option<serde_json::Value>,
}

impl App2AppKeyManager {
    pub fn new(keystore: Arc<dyn KeyStore>, storage: SessionStorage) -> Self {
        Self { keys: DeviceKeyManager::new(KeyPurpose::App2App, keystore, storage), device_info: None }
    }

    #[must_use]
    pub fn with_device_info(mut self, device_info: Option<serde_json::Value>) -> Self {
        self.device_info = device_info;
        self
    }

    /// Sign an app2app `setup` JWT over `challenge`.
    ///
    /// `force_new` rotates the key, which happens on every new session.
    pub async fn generate_jwt(&self, challenge: &str, force_new: bool) -> Result<String> {
        let key = self.keys.ensure_key(force_new, KeyProtection::Unprotected).await?;
        let payload = JwtPayload {
            challenge: Some(challenge.to_string()),
            action: Some(JwtAction::Setup),
            device_info: self.device_info.clone(),
            ..JwtPayload::issued_at(Utc::now().timestamp())
        };
        jwt::sign(
            self.keys.keystore(),
            KeyPurpose::App2App.header_type(),
            &key,
            &payload,
            SignAuthorization::Unattended,
        )
        .await
    }

    pub async fn delete_key(&self) -> Result<()> {
        self.keys.delete_key().await
    }
}
