//! Ctrl-C watcher.
//!
//! The first interrupt requests a graceful shutdown that the session loop
//! observes between turns. A second interrupt exits immediately.

use std::thread;

use anyhow::{Context, Result};
use tracing::{error, warn};

use crate::core::state::ShutdownFlag;
use crate::exit_codes;

/// Spawn the watcher thread. It lives until the process exits.
pub fn install(shutdown: ShutdownFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("build signal runtime")?;
    thread::Builder::new()
        .name("gridplay-interrupt".to_string())
        .spawn(move || runtime.block_on(watch(shutdown)))
        .context("spawn interrupt watcher")?;
    Ok(())
}

async fn watch(shutdown: ShutdownFlag) {
    loop {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(err = %err, "failed to listen for ctrl-c");
            return;
        }
        if shutdown.is_requested() {
            warn!("second interrupt, exiting immediately");
            std::process::exit(exit_codes::INTERRUPTED);
        }
        warn!("interrupt received, stopping after the current turn");
        shutdown.request();
    }
}
