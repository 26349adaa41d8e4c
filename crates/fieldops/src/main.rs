// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fieldops - a LINE bot for field check-ins and work submissions.
//!
//! This is the binary entry point for the Fieldops bot.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use fieldops_config::model::FieldopsConfig;
use fieldops_config::validation::validate_serve_requirements;
use fieldops_config::ConfigError;

/// Fieldops - a LINE bot for field check-ins and work submissions.
#[derive(Parser, Debug)]
#[command(name = "fieldops", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the default search order.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server and conversation engine.
    Serve,
    /// Validate the configuration and report what serve would use.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            fieldops_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("fieldops serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            print_check_config(&config);
        }
        None => {
            println!("fieldops: use --help for available commands");
        }
    }
}

/// Loads configuration from the default search order, or from an explicit
/// `--config` file merged over the defaults (environment variables still
/// apply on top).
fn load_config(path: Option<&Path>) -> Result<FieldopsConfig, Vec<ConfigError>> {
    match path {
        None => fieldops_config::load_and_validate(),
        Some(path) => {
            // Figment skips absent files silently; an explicit flag
            // pointing nowhere should fail loudly instead.
            if !path.is_file() {
                return Err(vec![ConfigError::Other(format!(
                    "config file not found: {}",
                    path.display()
                ))]);
            }
            let config = fieldops_config::load_config_from_path(path).map_err(|e| {
                let sources = std::fs::read_to_string(path)
                    .map(|content| vec![(path.display().to_string(), content)])
                    .unwrap_or_default();
                fieldops_config::diagnostic::figment_to_config_errors(e, &sources)
            })?;
            fieldops_config::validation::validate_config(&config)?;
            Ok(config)
        }
    }
}

/// Prints the `check-config` report: structural validity was already
/// established by the loader, so this shows what serve would run with and
/// which credentials are still missing. Missing credentials are reported
/// but do not fail the command.
fn print_check_config(config: &FieldopsConfig) {
    println!("fieldops: config OK (bot.name={})", config.bot.name);
    println!(
        "  webhook:  {}:{} (path /webhook)",
        config.line.bind_address, config.line.port
    );
    println!(
        "  sheets:   {} / {} / {} / {}",
        config.sheets.employees_sheet,
        config.sheets.checkins_sheet,
        config.sheets.submissions_sheet,
        config.sheets.locations_sheet
    );
    println!(
        "  flow:     timeout {}s, warning window {}s, sweep every {}s",
        config.flow.timeout_s, config.flow.warning_window_s, config.flow.sweep_interval_s
    );
    println!(
        "  line:     token {}, secret {}, capture page {}",
        presence(config.line.channel_access_token.is_some()),
        presence(config.line.channel_secret.is_some()),
        presence(config.line.liff_id.is_some())
    );
    println!(
        "  sheets:   spreadsheet {}, token {}",
        presence(config.sheets.spreadsheet_id.is_some()),
        presence(config.sheets.access_token.is_some())
    );
    println!(
        "  drive:    folder {}, token {}",
        presence(config.drive.folder_id.is_some()),
        presence(config.drive.access_token.is_some())
    );

    match validate_serve_requirements(config) {
        Ok(()) => println!("  serve:    ready"),
        Err(errors) => {
            println!("  serve:    not ready, {} credential(s) missing:", errors.len());
            for error in &errors {
                println!("            - {error}");
            }
        }
    }
}

fn presence(set: bool) -> &'static str {
    if set { "set" } else { "missing" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_accepts_a_global_config_flag() {
        let cli = Cli::parse_from(["fieldops", "serve", "--config", "/tmp/fieldops.toml"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/fieldops.toml")));
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let errors = load_config(Some(Path::new("/nonexistent/fieldops.toml"))).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("not found"));
    }
}
