// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal-driven shutdown for the serve command.
//!
//! Installs a handler for SIGINT and SIGTERM and exposes the result as a
//! [`CancellationToken`]. The engine loop, the timeout sweeper, and the
//! webhook server all watch the same token, so one signal winds down the
//! whole process.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Installs signal handlers for graceful shutdown (SIGINT and SIGTERM).
///
/// Returns a [`CancellationToken`] that is cancelled when either signal
/// arrives. The handler task runs in the background for the life of the
/// process.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}
