//! Logging setup for the command-line tool
//!
//! Output goes to stderr so it never mixes with highlighted text on stdout.
//! Filtering follows `RUST_LOG`:
//! - `RUST_LOG=debug` - all debug logs
//! - `RUST_LOG=synhl::syntax::tokenizer=debug` - module-level filtering

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber; defaults to `warn`
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_filter(filter);

    // A subscriber may already be installed when embedded in a larger program
    let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
}
