// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, sane timing relationships, and
//! quality ranges. Serve-time credential checks live here too so the binary
//! can report every problem in one pass.

use crate::diagnostic::ConfigError;
use crate::model::FieldopsConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &FieldopsConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate bind_address is not empty and looks like an IP or hostname
    let addr = config.line.bind_address.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "line.bind_address must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!(
                    "line.bind_address `{addr}` is not a valid IP address or hostname"
                ),
            });
        }
    }

    // The warning window must fit inside the transaction timeout, or no
    // warning could ever fire before the sweep finalizes.
    if config.flow.warning_window_s >= config.flow.timeout_s {
        errors.push(ConfigError::Validation {
            message: format!(
                "flow.warning_window_s ({}) must be smaller than flow.timeout_s ({})",
                config.flow.warning_window_s, config.flow.timeout_s
            ),
        });
    }

    if config.flow.sweep_interval_s == 0 {
        errors.push(ConfigError::Validation {
            message: "flow.sweep_interval_s must be at least 1".to_string(),
        });
    }

    if config.flow.max_gps_accuracy_m <= 0.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "flow.max_gps_accuracy_m must be positive, got {}",
                config.flow.max_gps_accuracy_m
            ),
        });
    }

    if !matches!(
        config.flow.no_match_policy.as_str(),
        "nearest_or_coords" | "coords_only" | "reject"
    ) {
        errors.push(ConfigError::Validation {
            message: format!(
                "flow.no_match_policy must be one of nearest_or_coords, coords_only, reject; got `{}`",
                config.flow.no_match_policy
            ),
        });
    }

    if config.sheets.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "sheets.max_attempts must be at least 1".to_string(),
        });
    }

    if config.sheets.backoff_base_s < 0.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "sheets.backoff_base_s must be non-negative, got {}",
                config.sheets.backoff_base_s
            ),
        });
    }

    for (key, quality) in [
        ("image.checkin_quality", config.image.checkin_quality),
        ("image.submission_quality", config.image.submission_quality),
    ] {
        if quality == 0 || quality > 100 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be in 1..=100, got {quality}"),
            });
        }
    }

    if config.image.max_dimension_px == 0 {
        errors.push(ConfigError::Validation {
            message: "image.max_dimension_px must be at least 1".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate the must-have settings for running the webhook server.
///
/// Separate from [`validate_config`] so `check-config` can pass on a config
/// that is structurally sound but not yet provisioned with credentials.
pub fn validate_serve_requirements(config: &FieldopsConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config
        .line
        .channel_access_token
        .as_deref()
        .is_none_or(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::MissingKey {
            key: "line.channel_access_token".to_string(),
        });
    }

    if config
        .line
        .channel_secret
        .as_deref()
        .is_none_or(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::MissingKey {
            key: "line.channel_secret".to_string(),
        });
    }

    if config
        .sheets
        .spreadsheet_id
        .as_deref()
        .is_none_or(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::MissingKey {
            key: "sheets.spreadsheet_id".to_string(),
        });
    }

    if config
        .sheets
        .access_token
        .as_deref()
        .is_none_or(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::MissingKey {
            key: "sheets.access_token".to_string(),
        });
    }

    // No drive.* checks here: a missing media store degrades softly at
    // runtime instead of blocking startup.

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = FieldopsConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn warning_window_must_fit_inside_timeout() {
        let toml_str = r#"
            [flow]
            timeout_s = 10
            warning_window_s = 10
        "#;
        let config: FieldopsConfig = toml::from_str(toml_str).unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("warning_window_s"))
        ));
    }

    #[test]
    fn bogus_no_match_policy_fails_validation() {
        let toml_str = r#"
            [flow]
            no_match_policy = "closest"
        "#;
        let config: FieldopsConfig = toml::from_str(toml_str).unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("no_match_policy"))
        ));
    }

    #[test]
    fn quality_out_of_range_fails_validation() {
        let mut config = FieldopsConfig::default();
        config.image.checkin_quality = 0;
        config.image.submission_quality = 101;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ConfigError::Validation { message } if message.contains("quality")))
                .count(),
            2
        );
    }

    #[test]
    fn serve_requirements_report_all_missing_credentials() {
        let config = FieldopsConfig::default();
        let errors = validate_serve_requirements(&config).unwrap_err();
        let missing: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::MissingKey { key } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert!(missing.contains(&"line.channel_access_token"));
        assert!(missing.contains(&"line.channel_secret"));
        assert!(missing.contains(&"sheets.spreadsheet_id"));
        assert!(missing.contains(&"sheets.access_token"));
    }

    #[test]
    fn provisioned_config_meets_serve_requirements() {
        let mut config = FieldopsConfig::default();
        config.line.channel_access_token = Some("token".to_string());
        config.line.channel_secret = Some("secret".to_string());
        config.sheets.spreadsheet_id = Some("sheet".to_string());
        config.sheets.access_token = Some("token".to_string());
        assert!(validate_serve_requirements(&config).is_ok());
        // Drive stays optional.
        assert!(config.drive.folder_id.is_none());
    }
}
