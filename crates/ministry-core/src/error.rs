//! Error metadata
//!
//! Errors across the workspace self-describe how they should be presented to
//! callers (status, machine-readable code, retry hint) through [`ErrorMetadata`].
//! The storage crate implements it for its own error type.

use crate::validation::UploadRejection;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code a serving layer should return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "UPLOAD_TOO_LARGE")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

impl ErrorMetadata for UploadRejection {
    fn http_status_code(&self) -> u16 {
        if self.is_too_large() {
            413
        } else if self.is_unsupported_type() {
            415
        } else {
            400
        }
    }

    fn error_code(&self) -> &'static str {
        if self.is_too_large() {
            "UPLOAD_TOO_LARGE"
        } else if self.is_unsupported_type() {
            "UNSUPPORTED_MEDIA_TYPE"
        } else {
            "INVALID_UPLOAD"
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn suggested_action(&self) -> Option<&'static str> {
        if self.is_too_large() {
            Some("Reduce file size and try again")
        } else {
            Some("Check the file type and try again")
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }

    fn is_sensitive(&self) -> bool {
        false
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CategoryPolicies;
    use crate::storage_types::StorageCategory;
    use crate::validation::validate_upload;

    #[test]
    fn test_too_large_takes_precedence_in_status() {
        let policies = CategoryPolicies::defaults();
        let err = validate_upload(&policies, StorageCategory::Avatar, "video/mp4", 6 * 1024 * 1024)
            .unwrap_err();
        assert_eq!(err.http_status_code(), 413);
        assert_eq!(err.error_code(), "UPLOAD_TOO_LARGE");
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_unsupported_type_metadata() {
        let policies = CategoryPolicies::defaults();
        let err = validate_upload(&policies, StorageCategory::Avatar, "text/plain", 10).unwrap_err();
        assert_eq!(err.http_status_code(), 415);
        assert_eq!(err.error_code(), "UNSUPPORTED_MEDIA_TYPE");
        assert!(!err.is_sensitive());
        assert!(err.client_message().contains("text/plain"));
    }
}
