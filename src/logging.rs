//! Logging setup.
//!
//! All logs go to **stderr**; stdout belongs to the host engine. Filtering
//! follows `RUST_LOG`. Without it, the provider logs at `info` and keeps the
//! HTTP stack (`hyper`, `reqwest`, `rustls`) at `warn`, so request bodies and
//! connection chatter stay out of the output.
//!
//! ```bash
//! # Every retry and HTTP attempt
//! RUST_LOG=hemmer_provider_datadog=debug ./hemmer-provider-datadog
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directives appended to every default level.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn";

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{QUIET_DEPENDENCIES}")))
}

fn subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize logging at `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level, used when `RUST_LOG` is
/// not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_filter(default_level)).init();
}

/// Try to initialize logging, returning false if a subscriber is already set.
pub fn try_init_logging() -> bool {
    subscriber(default_filter("info")).try_init().is_ok()
}
