//! Client configuration structures

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{DEFAULT_NAMESPACE, DEFAULT_PLATFORM};
use crate::types::ColorScheme;
use crate::{AuthgearError, Result};

/// Top-level SDK configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthgearConfig {
    /// OAuth client id registered in the Authgear project.
    pub client_id: String,
    /// Authgear endpoint, e.g. `https://myapp.authgear.cloud`.
    pub endpoint: String,
    /// Namespace for persisted state. Two containers with different names
    /// never share tokens or keys.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub is_sso_enabled: bool,
    #[serde(default)]
    pub app2app: App2AppOptions,
    #[serde(default = "default_true")]
    pub dpop_enabled: bool,
    /// Value sent as `x_platform`.
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub ui_locales: Option<Vec<String>>,
    #[serde(default)]
    pub color_scheme: Option<ColorScheme>,
    /// Opaque device description embedded in proof JWTs and `x_device_info`.
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// How incoming app2app requests are handled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App2AppOptions {
    /// If true, new sessions are prepared for participating in app2app
    /// authentication.
    #[serde(default)]
    pub is_enabled: bool,
}

/// HTTP transport tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Total attempts for idempotent requests (initial try + retries).
    pub max_attempts: usize,
    pub backoff_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30, max_attempts: 3, backoff_ms: 200 }
    }
}

/// Where file-backed stores live
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory for encrypted stores. `None` keeps everything in memory.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_name() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

const fn default_true() -> bool {
    true
}

impl AuthgearConfig {
    /// Minimal configuration with every optional setting at its default.
    pub fn new(client_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            endpoint: endpoint.into(),
            name: default_name(),
            is_sso_enabled: false,
            app2app: App2AppOptions::default(),
            dpop_enabled: true,
            platform: default_platform(),
            ui_locales: None,
            color_scheme: None,
            device_info: None,
            http: HttpSettings::default(),
            storage: StorageSettings::default(),
        }
    }

    /// Check required fields.
    ///
    /// # Errors
    /// Returns `AuthgearError::Config` if the client id or name is empty or
    /// the endpoint is not an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthgearError::Config("client_id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(AuthgearError::Config("name must not be empty".to_string()));
        }
        self.endpoint_url().map(|_| ())
    }

    /// The endpoint as a parsed URL.
    ///
    /// # Errors
    /// Returns `AuthgearError::Config` if the endpoint cannot be parsed or is
    /// not http(s).
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| AuthgearError::Config(format!("Invalid endpoint: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AuthgearError::Config(format!("Unsupported endpoint scheme: {other}"))),
        }
    }

    /// `scheme://host[:port]` of the endpoint, used as token-exchange audience.
    ///
    /// # Errors
    /// Returns `AuthgearError::Config` if the endpoint is invalid.
    pub fn endpoint_origin(&self) -> Result<String> {
        Ok(self.endpoint_url()?.origin().ascii_serialization())
    }
}
