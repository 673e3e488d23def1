//! HTTP transport shared by the protocol client

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
