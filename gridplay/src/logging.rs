//! Tracing setup for the player.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: turn-by-turn progress and diagnostics via
//!   `RUST_LOG`, output to stderr.
//!
//! - **Turn logs (`io/turn_log`)**: optional JSON dumps of each request,
//!   decision and frame, enabled by `[logs] turn_log_dir`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `gridplay=info,warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=gridplay=debug gridplay play ls20
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridplay=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
