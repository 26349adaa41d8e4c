// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `fieldops serve` command implementation.
//!
//! Wires the LINE webhook server, the Google Sheets row store, the Drive
//! media store, the conversation engine, and the timeout sweeper together,
//! then runs until SIGINT or SIGTERM. The webhook server feeds events into
//! the channel; the engine drains them; the sweeper closes expired
//! transactions in the background.

use std::sync::Arc;

use fieldops_config::model::FieldopsConfig;
use fieldops_config::validation::validate_serve_requirements;
use fieldops_core::error::FieldopsError;
use fieldops_core::MediaStore;
use fieldops_engine::shutdown;
use fieldops_engine::Engine;
use fieldops_google::{DriveStore, SheetsClient};
use fieldops_line::{webhook, LineChannel};
use fieldops_store::RowStore;
use tracing::{error, info};

/// Runs the `fieldops serve` command.
///
/// Checks serve credentials up front so every missing key is reported in
/// one pass, builds the adapters, and supervises the three long-running
/// pieces. A webhook server failure (a busy port, usually) cancels the
/// shared token and surfaces as the command's error.
pub async fn run_serve(config: FieldopsConfig) -> Result<(), FieldopsError> {
    init_tracing(&config.bot.log_level);
    info!(bot = %config.bot.name, "starting fieldops serve");

    if let Err(errors) = validate_serve_requirements(&config) {
        fieldops_config::render_errors(&errors);
        return Err(FieldopsError::Config(
            "serve requirements not met".to_string(),
        ));
    }

    // LINE channel: webhook intake plus the reply/push/content client.
    let channel = Arc::new(LineChannel::new(&config.line).map_err(|e| {
        error!(error = %e, "failed to initialize LINE channel");
        eprintln!(
            "error: LINE credentials required. Set line.channel_access_token and \
             line.channel_secret via config or FIELDOPS_LINE_* environment variables."
        );
        e
    })?);

    // Sheets is the system of record; serve cannot run without it.
    let backend = Arc::new(SheetsClient::new(&config.sheets).map_err(|e| {
        error!(error = %e, "failed to initialize Sheets backend");
        eprintln!(
            "error: Google Sheets credentials required. Set sheets.spreadsheet_id and \
             sheets.access_token via config or FIELDOPS_SHEETS_* environment variables."
        );
        e
    })?);

    // Drive is optional at startup. Without credentials image uploads are
    // refused with an operator notice while every other flow still works.
    let media = Arc::new(DriveStore::new(&config.drive)?);
    if media.is_ready() {
        info!("drive media store ready");
    } else {
        info!("drive media store not configured, image uploads will be refused");
    }

    let store = Arc::new(RowStore::new(backend, &config.sheets));
    let engine = Arc::new(Engine::new(store, channel.clone(), media, &config));

    let cancel = shutdown::install_signal_handler();

    // Webhook server. On failure it cancels the shared token so the engine
    // and sweeper wind down, and its error becomes the serve result.
    let server = tokio::spawn({
        let cancel = cancel.clone();
        let line_config = config.line.clone();
        let state = channel.webhook_state();
        async move {
            tokio::select! {
                result = webhook::serve(&line_config, state) => {
                    if let Err(ref e) = result {
                        error!(error = %e, "webhook server failed");
                        cancel.cancel();
                    }
                    result
                }
                _ = cancel.cancelled() => Ok(()),
            }
        }
    });

    let sweeper = tokio::spawn(engine.sweeper().run(cancel.clone()));

    // The engine loop runs in the foreground until the token cancels.
    engine.run(cancel.clone()).await;

    cancel.cancel();
    let server_result = match server.await {
        Ok(result) => result,
        Err(e) => Err(FieldopsError::Internal(format!(
            "webhook server task panicked: {e}"
        ))),
    };
    let _ = sweeper.await;

    server_result?;
    info!("fieldops serve shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Our crates at the configured level, dependencies at warn.
        EnvFilter::new(format!(
            "warn,fieldops={lvl},fieldops_engine={lvl},fieldops_store={lvl},\
             fieldops_line={lvl},fieldops_google={lvl},fieldops_config={lvl},\
             fieldops_geo={lvl},fieldops_imaging={lvl},fieldops_core={lvl}",
            lvl = log_level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
