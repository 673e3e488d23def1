//! Conversions from third-party errors into [`authgear_domain::AuthgearError`]

mod conversions;

pub use conversions::InfraError;
