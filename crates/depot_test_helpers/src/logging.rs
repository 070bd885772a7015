//! Test logging configuration utilities

use std::sync::Once;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INIT: Once = Once::new();

/// Initialize tracing for tests with custom log level
///
/// Only the first call per test process installs a subscriber; `RUST_LOG`
/// wins over `level` when set.
///
/// # Example
///
/// ```rust
/// use depot_test_helpers::logging::init_test_logging;
///
/// init_test_logging("debug");
/// ```
pub fn init_test_logging(level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Equivalent to `init_test_logging("error")`
pub fn suppress_logs() {
    init_test_logging("error");
}
