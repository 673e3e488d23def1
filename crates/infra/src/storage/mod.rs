//! Persistent [`authgear_core::SecureStorage`] implementations

pub mod encrypted_file;
pub mod keyring;
pub mod master_key;

pub use encrypted_file::EncryptedFileStorage;
pub use keyring::KeyringStorage;
pub use master_key::{generate_key, parse_hex_key, KeyringMasterKey};
