//! Persistence of session secrets, PKCE verifiers and device key ids

pub mod memory;
pub mod ports;
pub mod recovery;

use std::sync::Arc;

use authgear_domain::Result;

pub use memory::MemoryStorage;
pub use ports::SecureStorage;
pub use recovery::RecoveringStorage;

/// Which physical store a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Refresh tokens. May be swapped for a transient store.
    Token,
    /// Per-app flow state and device key ids.
    Container,
    /// State shared with other apps of the same vendor.
    Shared,
}

/// Every persisted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    RefreshToken,
    Verifier,
    AnonymousKeyId,
    BiometricKeyId,
    App2AppDeviceKeyId,
    IdToken,
    DeviceSecret,
    DPoPKeyId,
}

impl StorageKey {
    /// Key name inside its namespace.
    pub const fn name(self) -> &'static str {
        match self {
            Self::RefreshToken => "refresh_token",
            Self::Verifier => "verifier",
            Self::AnonymousKeyId => "anonymousKeyId",
            Self::BiometricKeyId => "biometricKeyId",
            Self::App2AppDeviceKeyId => "app2appDeviceKeyId",
            Self::IdToken => "idToken",
            Self::DeviceSecret => "deviceSecret",
            Self::DPoPKeyId => "dpopKeyId",
        }
    }

    pub const fn store(self) -> StoreKind {
        match self {
            Self::RefreshToken => StoreKind::Token,
            Self::Verifier
            | Self::AnonymousKeyId
            | Self::BiometricKeyId
            | Self::App2AppDeviceKeyId => StoreKind::Container,
            Self::IdToken | Self::DeviceSecret | Self::DPoPKeyId => StoreKind::Shared,
        }
    }
}

/// Typed facade over the three stores of one namespace
#[derive(Clone)]
pub struct SessionStorage {
    namespace: String,
    token: Arc<dyn SecureStorage>,
    container: Arc<dyn SecureStorage>,
    shared: Arc<dyn SecureStorage>,
}

impl SessionStorage {
    /// Each store is wrapped in a [`RecoveringStorage`].
    pub fn new(
        namespace: impl Into<String>,
        token: Arc<dyn SecureStorage>,
        container: Arc<dyn SecureStorage>,
        shared: Arc<dyn SecureStorage>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            token: Arc::new(RecoveringStorage::new(token, "token")),
            container: Arc::new(RecoveringStorage::new(container, "container")),
            shared: Arc::new(RecoveringStorage::new(shared, "shared")),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn store(&self, key: StorageKey) -> &dyn SecureStorage {
        match key.store() {
            StoreKind::Token => self.token.as_ref(),
            StoreKind::Container => self.container.as_ref(),
            StoreKind::Shared => self.shared.as_ref(),
        }
    }

    pub async fn get(&self, key: StorageKey) -> Result<Option<String>> {
        self.store(key).get(&self.namespace, key.name()).await
    }

    pub async fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        self.store(key).set(&self.namespace, key.name(), value).await
    }

    pub async fn delete(&self, key: StorageKey) -> Result<()> {
        self.store(key).delete(&self.namespace, key.name()).await
    }
}
