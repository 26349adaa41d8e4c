// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./fieldops.toml` > `~/.config/fieldops/fieldops.toml` > `/etc/fieldops/fieldops.toml`
//! with environment variable overrides via `FIELDOPS_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::FieldopsConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/fieldops/fieldops.toml` (system-wide)
/// 3. `~/.config/fieldops/fieldops.toml` (user XDG config)
/// 4. `./fieldops.toml` (local directory)
/// 5. `FIELDOPS_*` environment variables
pub fn load_config() -> Result<FieldopsConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used by tests and by callers that already hold the file contents.
pub fn load_config_from_str(toml_content: &str) -> Result<FieldopsConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FieldopsConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<FieldopsConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FieldopsConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(FieldopsConfig::default()))
        .merge(Toml::file("/etc/fieldops/fieldops.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("fieldops/fieldops.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("fieldops.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// CRITICAL: Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `FIELDOPS_LINE_CHANNEL_SECRET`
/// must map to `line.channel_secret`, not `line.channel.secret`.
fn env_provider() -> Env {
    Env::prefixed("FIELDOPS_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: FIELDOPS_SHEETS_SPREADSHEET_ID -> "sheets_spreadsheet_id"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("bot_", "bot.", 1)
            .replacen("line_", "line.", 1)
            .replacen("sheets_", "sheets.", 1)
            .replacen("drive_", "drive.", 1)
            .replacen("flow_", "flow.", 1)
            .replacen("image_", "image.", 1);
        mapped.into()
    })
}
