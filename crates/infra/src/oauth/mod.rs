//! HTTP implementation of the authorization server port

pub mod client;

pub use client::OAuthClient;
