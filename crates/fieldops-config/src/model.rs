// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Fieldops bot.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Fieldops configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values; required credentials
/// are enforced by validation, not deserialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldopsConfig {
    /// Bot identity and logging settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// LINE Messaging API integration settings.
    #[serde(default)]
    pub line: LineConfig,

    /// Google Sheets row-store settings.
    #[serde(default)]
    pub sheets: SheetsConfig,

    /// Google Drive media-store settings.
    #[serde(default)]
    pub drive: DriveConfig,

    /// Flow timing and geofence validation settings.
    #[serde(default)]
    pub flow: FlowConfig,

    /// Image pipeline settings.
    #[serde(default)]
    pub image: ImageConfig,
}

/// Bot identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Display name of the bot.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "fieldops".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// LINE Messaging API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LineConfig {
    /// Channel access token for the Messaging API. Required to serve.
    #[serde(default)]
    pub channel_access_token: Option<String>,

    /// Channel secret used to verify webhook signatures. Required to serve.
    #[serde(default)]
    pub channel_secret: Option<String>,

    /// LIFF app id of the GPS capture page. `None` omits the
    /// open-capture-page button from location request messages.
    #[serde(default)]
    pub liff_id: Option<String>,

    /// Address to bind the webhook server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port for the webhook server.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            channel_secret: None,
            liff_id: None,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Google Sheets row-store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SheetsConfig {
    /// Spreadsheet id holding the Employees/Checkins/Submissions/Locations tabs.
    /// Required to serve.
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    /// OAuth bearer token for the Sheets API. Token acquisition and refresh
    /// happen outside the process.
    #[serde(default)]
    pub access_token: Option<String>,

    /// API base URL, overridable for tests.
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,

    /// Hard per-call timeout for interactive reads and writes, in seconds.
    #[serde(default = "default_sheets_timeout_s")]
    pub execute_timeout_s: u64,

    /// Short timeout for the sweeper's no-retry quick reads, in seconds.
    #[serde(default = "default_quick_timeout_s")]
    pub quick_timeout_s: u64,

    /// Attempt count for the interactive retry loop.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay in seconds; doubles per attempt.
    #[serde(default = "default_backoff_base_s")]
    pub backoff_base_s: f64,

    /// TTL of the Employees read cache, in seconds.
    #[serde(default = "default_employee_cache_ttl_s")]
    pub employee_cache_ttl_s: u64,

    /// Tab name of the employee roster.
    #[serde(default = "default_employees_sheet")]
    pub employees_sheet: String,

    /// Tab name of check-in transaction records.
    #[serde(default = "default_checkins_sheet")]
    pub checkins_sheet: String,

    /// Tab name of submission transaction records.
    #[serde(default = "default_submissions_sheet")]
    pub submissions_sheet: String,

    /// Tab name of the site reference list.
    #[serde(default = "default_locations_sheet")]
    pub locations_sheet: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            access_token: None,
            api_base: default_sheets_api_base(),
            execute_timeout_s: default_sheets_timeout_s(),
            quick_timeout_s: default_quick_timeout_s(),
            max_attempts: default_max_attempts(),
            backoff_base_s: default_backoff_base_s(),
            employee_cache_ttl_s: default_employee_cache_ttl_s(),
            employees_sheet: default_employees_sheet(),
            checkins_sheet: default_checkins_sheet(),
            submissions_sheet: default_submissions_sheet(),
            locations_sheet: default_locations_sheet(),
        }
    }
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com/v4/spreadsheets".to_string()
}

fn default_sheets_timeout_s() -> u64 {
    20
}

fn default_quick_timeout_s() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_s() -> f64 {
    1.5
}

fn default_employee_cache_ttl_s() -> u64 {
    30
}

fn default_employees_sheet() -> String {
    "Employees".to_string()
}

fn default_checkins_sheet() -> String {
    "Checkins".to_string()
}

fn default_submissions_sheet() -> String {
    "Submissions".to_string()
}

fn default_locations_sheet() -> String {
    "Locations".to_string()
}

/// Google Drive media-store configuration.
///
/// Both `folder_id` and `access_token` are optional: when either is missing
/// the engine degrades softly and tells users storage is not connected.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DriveConfig {
    /// Target folder for uploaded evidence images.
    #[serde(default)]
    pub folder_id: Option<String>,

    /// OAuth bearer token for the Drive API.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Upload API base URL, overridable for tests.
    #[serde(default = "default_drive_upload_base")]
    pub upload_base: String,

    /// Metadata API base URL, overridable for tests.
    #[serde(default = "default_drive_api_base")]
    pub api_base: String,

    /// Hard per-call timeout for uploads and permission grants, in seconds.
    #[serde(default = "default_drive_timeout_s")]
    pub execute_timeout_s: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            folder_id: None,
            access_token: None,
            upload_base: default_drive_upload_base(),
            api_base: default_drive_api_base(),
            execute_timeout_s: default_drive_timeout_s(),
        }
    }
}

fn default_drive_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_drive_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_drive_timeout_s() -> u64 {
    15
}

/// Flow timing and location validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Wall-clock budget of an open transaction, in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,

    /// Width of the pre-timeout warning window, in seconds.
    #[serde(default = "default_warning_window_s")]
    pub warning_window_s: u64,

    /// Background sweep interval, in seconds.
    #[serde(default = "default_sweep_interval_s")]
    pub sweep_interval_s: u64,

    /// Maximum accepted GPS accuracy radius, in meters.
    #[serde(default = "default_max_gps_accuracy_m")]
    pub max_gps_accuracy_m: f64,

    /// Maximum accepted age of a location fix, in seconds.
    #[serde(default = "default_max_location_age_s")]
    pub max_location_age_s: u64,

    /// Behavior when no site's geofence contains the fix:
    /// "nearest_or_coords", "coords_only", or "reject".
    #[serde(default = "default_no_match_policy")]
    pub no_match_policy: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            timeout_s: default_timeout_s(),
            warning_window_s: default_warning_window_s(),
            sweep_interval_s: default_sweep_interval_s(),
            max_gps_accuracy_m: default_max_gps_accuracy_m(),
            max_location_age_s: default_max_location_age_s(),
            no_match_policy: default_no_match_policy(),
        }
    }
}

fn default_timeout_s() -> u64 {
    180
}

fn default_warning_window_s() -> u64 {
    10
}

fn default_sweep_interval_s() -> u64 {
    30
}

fn default_max_gps_accuracy_m() -> f64 {
    50.0
}

fn default_max_location_age_s() -> u64 {
    60
}

fn default_no_match_policy() -> String {
    "nearest_or_coords".to_string()
}

/// Image pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    /// Longest side of a re-encoded image, in pixels.
    #[serde(default = "default_max_dimension_px")]
    pub max_dimension_px: u32,

    /// JPEG quality for check-in evidence (1-100).
    #[serde(default = "default_checkin_quality")]
    pub checkin_quality: u8,

    /// JPEG quality for submission evidence (1-100).
    #[serde(default = "default_submission_quality")]
    pub submission_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension_px: default_max_dimension_px(),
            checkin_quality: default_checkin_quality(),
            submission_quality: default_submission_quality(),
        }
    }
}

fn default_max_dimension_px() -> u32 {
    1600
}

fn default_checkin_quality() -> u8 {
    75
}

fn default_submission_quality() -> u8 {
    90
}
