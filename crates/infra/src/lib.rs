//! # Authgear Infrastructure
//!
//! Infrastructure implementations of the core ports.
//!
//! This crate contains:
//! - The reqwest protocol client with retry and DPoP attachment
//! - A software RSA keystore
//! - Encrypted file and OS keyring storage
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `authgear-core`
//! - Contains all "impure" code (HTTP, files, keyring)

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod http;
pub mod keystore;
pub mod oauth;
pub mod observability;
pub mod storage;

// Re-export commonly used items
pub use bootstrap::Bootstrap;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use keystore::SoftwareKeyStore;
pub use oauth::OAuthClient;
pub use storage::{EncryptedFileStorage, KeyringMasterKey, KeyringStorage};
