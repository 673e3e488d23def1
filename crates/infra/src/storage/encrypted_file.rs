//! AES-256-GCM encrypted file per namespace
//!
//! Each namespace is one file holding a JSON envelope
//! `{"version", "nonce", "ciphertext"}` whose plaintext is the JSON map of
//! every key. The namespace is bound as associated data, so a file copied
//! over another namespace fails to decrypt. Writes go through a temp file and
//! a rename under a per-store mutex.
//!
//! Damage maps onto the recoverable corruption kinds: an unreadable or
//! unwritable file is `Io`, an envelope or plaintext that does not parse is
//! `MalformedEncoding`, and a failed decryption is `Cryptographic`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use authgear_core::SecureStorage;
use authgear_domain::{AuthgearError, CorruptionKind, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

type Entries = BTreeMap<String, String>;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    nonce: String,
    ciphertext: String,
}

fn corrupted(kind: CorruptionKind, message: impl Into<String>) -> AuthgearError {
    AuthgearError::StorageCorrupted { kind, message: message.into() }
}

/// File-backed [`SecureStorage`]
pub struct EncryptedFileStorage {
    directory: PathBuf,
    cipher: Aes256Gcm,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for EncryptedFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStorage")
            .field("directory", &self.directory)
            .field("cipher", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStorage {
    /// Store files under `directory` encrypted with `key`.
    ///
    /// The directory is created on first write.
    ///
    /// # Errors
    /// `Internal` if the cipher cannot be initialised.
    pub fn new(directory: impl Into<PathBuf>, key: &[u8; 32]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| {
            AuthgearError::Internal(format!("Failed to create encryption cipher: {e}"))
        })?;
        Ok(Self { directory: directory.into(), cipher, write_lock: Mutex::new(()) })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Hex-encoded so that any namespace is a safe file name.
    fn path(&self, namespace: &str) -> PathBuf {
        self.directory.join(format!("{}.store", hex::encode(namespace)))
    }

    async fn load(&self, namespace: &str) -> Result<Entries> {
        let path = self.path(namespace);
        match tokio::fs::read(&path).await {
            Ok(bytes) => self.decrypt(namespace, &bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(err) => Err(corrupted(CorruptionKind::Io, format!("read {}: {err}", path.display()))),
        }
    }

    async fn save(&self, namespace: &str, entries: &Entries) -> Result<()> {
        let bytes = self.encrypt(namespace, entries)?;
        let path = self.path(namespace);
        let temp = path.with_extension("store.tmp");
        let io = |err: std::io::Error| {
            corrupted(CorruptionKind::Io, format!("write {}: {err}", path.display()))
        };

        tokio::fs::create_dir_all(&self.directory).await.map_err(io)?;
        tokio::fs::write(&temp, &bytes).await.map_err(io)?;
        tokio::fs::rename(&temp, &path).await.map_err(io)
    }

    fn encrypt(&self, namespace: &str, entries: &Entries) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(entries)
            .map_err(|e| AuthgearError::Storage(format!("serialize store: {e}")))?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(
                &Nonce::from(nonce),
                Payload { msg: &plaintext, aad: namespace.as_bytes() },
            )
            .map_err(|e| AuthgearError::Storage(format!("Encryption failed: {e}")))?;
        let envelope = Envelope {
            version: FORMAT_VERSION,
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| AuthgearError::Storage(format!("serialize envelope: {e}")))
    }

    fn decrypt(&self, namespace: &str, bytes: &[u8]) -> Result<Entries> {
        let malformed = |message: String| corrupted(CorruptionKind::MalformedEncoding, message);

        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| malformed(format!("envelope: {e}")))?;
        if envelope.version != FORMAT_VERSION {
            return Err(malformed(format!("unsupported version {}", envelope.version)));
        }
        let nonce: [u8; NONCE_LEN] = BASE64
            .decode(&envelope.nonce)
            .map_err(|e| malformed(format!("nonce: {e}")))?
            .try_into()
            .map_err(|_| malformed("nonce must be 12 bytes".to_string()))?;
        let ciphertext =
            BASE64.decode(&envelope.ciphertext).map_err(|e| malformed(format!("ciphertext: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(&Nonce::from(nonce), Payload { msg: &ciphertext, aad: namespace.as_bytes() })
            .map_err(|e| corrupted(CorruptionKind::Cryptographic, format!("Decryption failed: {e}")))?;
        serde_json::from_slice(&plaintext).map_err(|e| malformed(format!("entries: {e}")))
    }
}

#[async_trait]
impl SecureStorage for EncryptedFileStorage {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self.load(namespace).await?.remove(key))
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(namespace).await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(namespace, &entries).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(namespace).await?;
        if entries.remove(key).is_some() {
            self.save(namespace, &entries).await?;
        }
        Ok(())
    }

    async fn recreate(&self, namespace: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(namespace);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed damaged store");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(corrupted(CorruptionKind::Io, format!("remove {}: {err}", path.display())))
            }
        }
    }
}
