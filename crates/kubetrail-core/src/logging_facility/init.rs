//! Logging initialization module

use std::sync::Once;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output for development
    Development,
    /// JSON structured output for production
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility
///
/// Call once per process; later calls are no-ops. `RUST_LOG` overrides the
/// profile's default filter. When a global subscriber is already installed
/// (by the host program or a test harness) that one stays in charge, and a
/// debug event saying so is sent to it.
///
/// - **Development**: human-readable, `kubetrail=debug`
/// - **Production**: JSON lines, `kubetrail=info`
/// - **Test**: bare registry; use `init_test_capture()` to record events
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let result = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("kubetrail=debug")),
                )
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("kubetrail=info")),
                )
                .finish()
                .try_init(),
            Profile::Test => tracing_subscriber::registry().try_init(),
        };
        installed(&format!("{:?}", profile), result);
    });
}

/// Whether a subscriber install took effect; a refused install is logged.
pub(crate) fn installed(profile: &str, result: Result<(), TryInitError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(profile, error = %e, "global subscriber already set; keeping it");
            false
        }
    }
}
