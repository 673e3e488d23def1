//! OS keyring backed storage
//!
//! One keyring entry per namespace (service `{service}`, account
//! `{namespace}`) holding the JSON map of every key. Keyring calls block, so
//! they run on the blocking pool under a per-store lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use authgear_core::SecureStorage;
use authgear_domain::{AuthgearError, CorruptionKind, Result};
use keyring::Entry;
use parking_lot::Mutex;

use crate::errors::InfraError;

type Entries = BTreeMap<String, String>;

/// [`SecureStorage`] over the platform credential store
#[derive(Clone)]
pub struct KeyringStorage {
    service: Arc<str>,
    lock: Arc<Mutex<()>>,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: Arc::from(service.into()), lock: Arc::new(Mutex::new(())) }
    }

    /// Run `op` on the entries of `namespace` on the blocking pool.
    async fn with_entries<T, F>(&self, namespace: &str, op: F) -> Result<T>
    where
        F: FnOnce(&Entry, &mut Option<Entries>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = self.service.clone();
        let lock = self.lock.clone();
        let namespace = namespace.to_string();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            let entry = Entry::new(&service, &namespace).map_err(InfraError::from)?;
            let mut entries = read_entries(&entry)?;
            op(&entry, &mut entries)
        })
        .await
        .map_err(|e| AuthgearError::Internal(format!("keyring task failed: {e}")))?
    }
}

/// `None` when the entry does not exist.
fn read_entries(entry: &Entry) -> Result<Option<Entries>> {
    match entry.get_password() {
        Ok(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
            AuthgearError::StorageCorrupted {
                kind: CorruptionKind::MalformedEncoding,
                message: format!("keyring entry: {e}"),
            }
        }),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(InfraError::from(err).into()),
    }
}

fn write_entries(entry: &Entry, entries: &Entries) -> Result<()> {
    let raw = serde_json::to_string(entries)
        .map_err(|e| AuthgearError::Storage(format!("serialize keyring entry: {e}")))?;
    Ok(entry.set_password(&raw).map_err(InfraError::from)?)
}

fn delete_entry(entry: &Entry) -> Result<()> {
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => Err(InfraError::from(err).into()),
    }
}

#[async_trait]
impl SecureStorage for KeyringStorage {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_entries(namespace, move |_, entries| {
            Ok(entries.as_mut().and_then(|entries| entries.remove(&key)))
        })
        .await
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_entries(namespace, move |entry, entries| {
            let entries = entries.get_or_insert_with(Entries::new);
            entries.insert(key, value);
            write_entries(entry, entries)
        })
        .await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_entries(namespace, move |entry, entries| {
            let Some(entries) = entries.as_mut() else {
                return Ok(());
            };
            if entries.remove(&key).is_none() {
                return Ok(());
            }
            if entries.is_empty() {
                delete_entry(entry)
            } else {
                write_entries(entry, entries)
            }
        })
        .await
    }

    async fn recreate(&self, namespace: &str) -> Result<()> {
        let service = self.service.clone();
        let lock = self.lock.clone();
        let namespace = namespace.to_string();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            delete_entry(&Entry::new(&service, &namespace).map_err(InfraError::from)?)
        })
        .await
        .map_err(|e| AuthgearError::Internal(format!("keyring task failed: {e}")))?
    }
}
