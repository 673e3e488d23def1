//! # Authgear Domain
//!
//! Data types shared by every layer of the Authgear client SDK.
//!
//! This crate contains:
//! - The SDK error type and `Result` alias
//! - Client configuration structures
//! - OIDC wire types (discovery document, token request/response, userinfo)
//! - Session state and change reasons
//! - JWT / JWK structures used for device-bound grants and DPoP
//! - Option structs accepted by the authentication flows
//!
//! ## Architecture
//! - No dependencies on other Authgear crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
