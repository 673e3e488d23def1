//! In-memory store for transient sessions

use std::collections::HashMap;

use async_trait::async_trait;
use authgear_domain::Result;
use parking_lot::RwLock;

use super::ports::SecureStorage;

/// Process-local store; nothing survives a restart
#[derive(Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<(String, String), String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(&(namespace.to_string(), key.to_string())).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.values.write().insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.values.write().remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    async fn recreate(&self, namespace: &str) -> Result<()> {
        self.values.write().retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}
