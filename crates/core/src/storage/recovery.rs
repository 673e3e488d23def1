//! Self-healing decorator for encrypted stores
//!
//! Restoring an app from backup can bring back an encrypted store whose
//! master key was not restored with it. Every later read then fails until
//! the store is deleted. The decorator catches exactly the corruption kinds,
//! recreates the namespace and retries the operation once.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use authgear_domain::Result;
use tracing::warn;

use super::ports::SecureStorage;

/// Wraps a [`SecureStorage`] with one-shot corruption recovery
pub struct RecoveringStorage {
    inner: Arc<dyn SecureStorage>,
    label: &'static str,
}

impl RecoveringStorage {
    /// `label` names the store in log events.
    pub fn new(inner: Arc<dyn SecureStorage>, label: &'static str) -> Self {
        Self { inner, label }
    }

    async fn with_recovery<T, F, Fut>(&self, namespace: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        match op().await {
            Err(err) if err.corruption_kind().is_some() => {
                warn!(
                    store = self.label,
                    namespace,
                    kind = ?err.corruption_kind(),
                    error = %err,
                    "Recreating corrupted store"
                );
                self.inner.recreate(namespace).await?;
                op().await
            }
            other => other,
        }
    }
}

#[async_trait]
impl SecureStorage for RecoveringStorage {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        self.with_recovery(namespace, || self.inner.get(namespace, key)).await
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.with_recovery(namespace, || self.inner.set(namespace, key, value)).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.with_recovery(namespace, || self.inner.delete(namespace, key)).await
    }

    async fn recreate(&self, namespace: &str) -> Result<()> {
        self.inner.recreate(namespace).await
    }
}
