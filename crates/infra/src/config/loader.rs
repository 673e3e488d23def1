//! Configuration loader
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `AUTHGEAR_CLIENT_ID` (required): OAuth client id
//! - `AUTHGEAR_ENDPOINT` (required): Authgear endpoint URL
//! - `AUTHGEAR_NAME`: Storage namespace
//! - `AUTHGEAR_SSO_ENABLED`: Share the browser session (true/false)
//! - `AUTHGEAR_APP2APP_ENABLED`: Prepare sessions for app2app (true/false)
//! - `AUTHGEAR_DPOP_ENABLED`: Bind tokens with DPoP (true/false, default true)
//! - `AUTHGEAR_UI_LOCALES`: Comma-separated BCP 47 tags
//! - `AUTHGEAR_STORAGE_DIR`: Directory of the encrypted stores
//!
//! ## File Locations
//! `authgear.{toml,json}` and `config.{toml,json}` in the current working
//! directory, then its parent and grandparent.

use std::path::{Path, PathBuf};

use authgear_domain::{AuthgearConfig, AuthgearError, Result};

const FILE_NAMES: [&str; 4] = ["authgear.toml", "authgear.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `AuthgearError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> Result<AuthgearConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `AuthgearError::Config` if a required variable is missing or the
/// result does not validate.
pub fn load_from_env() -> Result<AuthgearConfig> {
    let mut config = AuthgearConfig::new(env_var("AUTHGEAR_CLIENT_ID")?, env_var("AUTHGEAR_ENDPOINT")?);

    if let Ok(name) = std::env::var("AUTHGEAR_NAME") {
        config.name = name;
    }
    config.is_sso_enabled = env_bool("AUTHGEAR_SSO_ENABLED", false);
    config.app2app.is_enabled = env_bool("AUTHGEAR_APP2APP_ENABLED", false);
    config.dpop_enabled = env_bool("AUTHGEAR_DPOP_ENABLED", true);
    config.ui_locales = std::env::var("AUTHGEAR_UI_LOCALES").ok().map(|raw| {
        raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    });
    config.storage.directory = std::env::var("AUTHGEAR_STORAGE_DIR").ok();

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. The format is
/// detected by extension.
///
/// # Errors
/// Returns `AuthgearError::Config` if the file is missing, malformed or does
/// not validate.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AuthgearConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AuthgearError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            AuthgearError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| AuthgearError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<AuthgearConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| AuthgearError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| AuthgearError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(AuthgearError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    probe_from(&cwd)
}

fn probe_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take(3)
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        AuthgearError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
