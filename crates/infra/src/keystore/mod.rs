//! Key store implementations

pub mod software;

pub use software::SoftwareKeyStore;
