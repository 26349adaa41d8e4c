// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Fieldops workflow engine.

use thiserror::Error;

/// The primary error type used across all Fieldops adapter traits and core operations.
#[derive(Debug, Error)]
pub enum FieldopsError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Row-store backend errors (transport failure, rejected write, malformed range).
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging channel errors (delivery failure, content download, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Media store errors (upload failure, permission grant, missing folder target).
    #[error("media error: {message}")]
    Media {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Image processing errors (undecodable bytes, unsupported format).
    #[error("image error: {0}")]
    Image(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FieldopsError {
    /// Whether the error is worth retrying on the interactive path.
    ///
    /// Timeouts and store transport failures are transient; validation-style
    /// errors (config, image decode) never are.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FieldopsError::Timeout { .. }
                | FieldopsError::Store { .. }
                | FieldopsError::Channel { .. }
                | FieldopsError::Media { .. }
        )
    }
}
