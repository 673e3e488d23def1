//! Wiring of the infra adapters into an [`Authgear`] container
//!
//! With `storage.directory` set, the token, container, shared and key stores
//! are encrypted files under `{directory}/{token,container,shared,keys}`,
//! encrypted with a master key from the OS keyring unless one is supplied.
//! Without it everything stays in memory.

use std::path::Path;
use std::sync::Arc;

use authgear_core::storage::RecoveringStorage;
use authgear_core::{
    Authgear, BiometricPrompt, DPoPKeyManager, DPoPProvider, KeyStore, MemoryStorage,
    SecureStorage, SessionStorage, UiPresenter,
};
use authgear_domain::{AuthgearConfig, Result};
use tracing::info;

use crate::http::HttpClient;
use crate::keystore::SoftwareKeyStore;
use crate::oauth::OAuthClient;
use crate::storage::{EncryptedFileStorage, KeyringMasterKey};

const USER_AGENT: &str = concat!("authgear-sdk-rust/", env!("CARGO_PKG_VERSION"));

/// Builder for a fully wired [`Authgear`]
pub struct Bootstrap {
    config: AuthgearConfig,
    presenter: Option<Arc<dyn UiPresenter>>,
    biometric: Option<Arc<dyn BiometricPrompt>>,
    transient_session: bool,
    master_key: Option<[u8; 32]>,
}

struct Stores {
    token: Arc<dyn SecureStorage>,
    container: Arc<dyn SecureStorage>,
    shared: Arc<dyn SecureStorage>,
    keys: Option<Arc<dyn SecureStorage>>,
}

impl Bootstrap {
    pub fn new(config: AuthgearConfig) -> Self {
        Self { config, presenter: None, biometric: None, transient_session: false, master_key: None }
    }

    #[must_use]
    pub fn with_presenter(mut self, presenter: Arc<dyn UiPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    #[must_use]
    pub fn with_biometric_prompt(mut self, biometric: Arc<dyn BiometricPrompt>) -> Self {
        self.biometric = Some(biometric);
        self
    }

    /// Keep the refresh token in memory only, so the session ends with the
    /// process.
    #[must_use]
    pub const fn transient_session(mut self, transient: bool) -> Self {
        self.transient_session = transient;
        self
    }

    /// Encrypt file stores with this key instead of the keyring's.
    #[must_use]
    pub const fn with_master_key(mut self, key: [u8; 32]) -> Self {
        self.master_key = Some(key);
        self
    }

    fn stores(&self) -> Result<Stores> {
        let Some(directory) = self.config.storage.directory.as_deref() else {
            return Ok(Stores {
                token: Arc::new(MemoryStorage::new()),
                container: Arc::new(MemoryStorage::new()),
                shared: Arc::new(MemoryStorage::new()),
                keys: None,
            });
        };
        let key = match self.master_key {
            Some(key) => key,
            None => KeyringMasterKey::default().get_or_create()?,
        };
        let directory = Path::new(directory);
        let file = |name: &str| -> Result<Arc<dyn SecureStorage>> {
            Ok(Arc::new(EncryptedFileStorage::new(directory.join(name), &key)?))
        };
        Ok(Stores {
            token: file("token")?,
            container: file("container")?,
            shared: file("shared")?,
            keys: Some(file("keys")?),
        })
    }

    /// # Errors
    /// `Config` for an invalid configuration or a missing presenter, and
    /// keyring failures while fetching the master key.
    pub fn build(self) -> Result<Authgear> {
        self.config.validate()?;
        let mut stores = self.stores()?;
        if self.transient_session {
            stores.token = Arc::new(MemoryStorage::new());
        }
        let storage =
            SessionStorage::new(self.config.name.clone(), stores.token, stores.container, stores.shared);

        let keystore: Arc<dyn KeyStore> = match stores.keys {
            Some(keys) => Arc::new(SoftwareKeyStore::persistent(
                Arc::new(RecoveringStorage::new(keys, "keys")),
                self.config.name.clone(),
            )),
            None => Arc::new(SoftwareKeyStore::new()),
        };

        let mut http = HttpClient::builder().settings(&self.config.http).user_agent(USER_AGENT);
        let dpop = self
            .config
            .dpop_enabled
            .then(|| Arc::new(DPoPKeyManager::new(Arc::clone(&keystore), storage.clone())));
        if let Some(dpop) = &dpop {
            http = http.dpop(Arc::clone(dpop) as Arc<dyn DPoPProvider>);
        }
        let oauth = OAuthClient::new(&self.config, http.build()?)?;

        info!(
            name = %self.config.name,
            persistent = self.config.storage.directory.is_some(),
            transient_session = self.transient_session,
            dpop = dpop.is_some(),
            "Bootstrapping Authgear"
        );

        let mut builder = Authgear::builder(self.config)
            .with_oauth(Arc::new(oauth))
            .with_keystore(keystore)
            .with_storage(storage);
        if let Some(presenter) = self.presenter {
            builder = builder.with_presenter(presenter);
        }
        if let Some(biometric) = self.biometric {
            builder = builder.with_biometric_prompt(biometric);
        }
        if let Some(dpop) = dpop {
            builder = builder.with_dpop(dpop);
        }
        builder.build()
    }
}
