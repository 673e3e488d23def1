//! Port interface for namespaced secret persistence

use async_trait::async_trait;
use authgear_domain::Result;

/// Encrypted key-value store partitioned by namespace
///
/// Implementations report backup/restore damage as
/// `AuthgearError::StorageCorrupted` so that [`super::RecoveringStorage`] can
/// heal it.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read a value. Missing keys return `None`.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Write a value atomically.
    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    /// Discard every value of `namespace` and start from an empty store.
    async fn recreate(&self, namespace: &str) -> Result<()>;
}
