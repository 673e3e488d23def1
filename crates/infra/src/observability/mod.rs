//! Tracing subscriber setup
//!
//! The SDK only emits `tracing` events. Host applications that do not install
//! their own subscriber can call [`init_tracing`].

use authgear_domain::{AuthgearError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` if set and valid, otherwise `info`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global fmt subscriber, optionally emitting JSON lines.
///
/// # Errors
/// `Internal` if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<()> {
    let registry = Registry::default().with(env_filter());
    let result = if json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.map_err(|e| AuthgearError::Internal(format!("failed to install tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `init_tracing` behavior for the repeated installation
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a second call reports an error instead of panicking.
    #[test]
    fn test_init_tracing_only_once() {
        let _ = init_tracing(false);
        assert!(matches!(init_tracing(true), Err(AuthgearError::Internal(_))));
    }
}
