//! Error response rendering
//!
//! Turns any error implementing [`ErrorMetadata`] into the JSON body a
//! serving layer or the CLI reports to its caller.

use std::fmt::Display;

use ministry_core::{ErrorMetadata, LogLevel};
use serde::Serialize;

/// Standard error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub error_type: String,
    pub status: u16,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorResponse {
    /// Build a response from `err`. Internal details of sensitive errors are
    /// dropped when `production` is set.
    pub fn from_error<E>(err: &E, production: bool) -> Self
    where
        E: ErrorMetadata + Display,
    {
        let details = if production && err.is_sensitive() {
            None
        } else {
            Some(err.to_string())
        };

        Self {
            error: err.client_message(),
            details,
            error_type: err.error_code().to_string(),
            status: err.http_status_code(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action().map(String::from),
        }
    }

    /// Log `err` at the level it asks for.
    pub fn log<E>(err: &E)
    where
        E: ErrorMetadata + Display,
    {
        match err.log_level() {
            LogLevel::Debug => tracing::debug!(error = %err, code = err.error_code(), "Request failed"),
            LogLevel::Warn => tracing::warn!(error = %err, code = err.error_code(), "Request failed"),
            LogLevel::Error => tracing::error!(error = %err, code = err.error_code(), "Request failed"),
        }
    }
}
