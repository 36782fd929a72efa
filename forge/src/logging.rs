//! Diagnostic tracing for the `forge` binary.
//!
//! Tracing output goes to stderr and is controlled by `RUST_LOG`. Product
//! output (the final component, verdict JSON, session artifacts) never goes
//! through tracing.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=forge=debug forge generate "login card"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
