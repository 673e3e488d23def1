//! # Authgear Core
//!
//! Client-side authentication logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - PKCE, JWK thumbprints and compact JWT signing
//! - Device key managers (anonymous, biometric, app2app, DPoP)
//! - The namespaced storage facade and its corruption recovery
//! - The session state machine and single-flight token refresh
//! - The [`Authgear`] container that drives every flow
//!
//! ## Architecture Principles
//! - Only depends on `authgear-domain`
//! - No HTTP, keychain or platform UI code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod client;
pub mod interaction;
pub mod jwk;
pub mod jwt;
pub mod keys;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod storage;

// In-memory fakes of every port
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{
    Authgear, AuthgearBuilder, AuthenticationRequest, ConfigureOptions, WechatAuthRequest,
};
pub use interaction::{
    BiometricPrompt, ChannelPresenter, InteractionRegistry, PendingInteraction, UiPresenter,
};
pub use keys::{
    App2AppKeyManager, DPoPKeyManager, DPoPProvider, KeyPairHandle, KeyProtection, KeyStore,
    SignAuthorization,
};
pub use oauth::OAuthProvider;
pub use pkce::PkceChallenge;
pub use storage::{MemoryStorage, SecureStorage, SessionStorage, StorageKey};
