// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-phase shutdown.
//!
//! The first SIGINT/SIGTERM cancels the returned token so every role drains.
//! A second signal, or [`FORCE_EXIT_AFTER`] without a clean exit, terminates
//! the process with status 1.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Grace period between the first signal and a forced exit.
pub const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// Install the signal handlers and return the token they cancel.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => info!(signal = name, "initiating shutdown"),
            Err(e) => {
                error!(error = %e, "failed to install signal handlers");
                return;
            }
        }
        token_clone.cancel();

        tokio::select! {
            second = wait_for_signal() => {
                if let Ok(name) = second {
                    warn!(signal = name, "second signal received, exiting now");
                }
            }
            _ = tokio::time::sleep(FORCE_EXIT_AFTER) => {
                warn!(timeout_secs = FORCE_EXIT_AFTER.as_secs(), "drain timed out, exiting now");
            }
        }
        std::process::exit(1);
    });

    debug!("signal handlers installed");
    token
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.map(|_| "SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl+C")
}
