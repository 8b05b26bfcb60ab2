//! Error mapping shared by the REST-backed adapters.

use reqwest::StatusCode;

use crate::traits::StorageError;

pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> StorageError {
    StorageError::Unavailable(format!("{} request failed: {}", provider, e))
}

/// Server-side, throttling and expired-auth statuses are worth retrying; the rest are refusals.
pub(crate) fn status_error(provider: &str, operation: &str, status: StatusCode, body: &str) -> StorageError {
    let message = format!("{} {} returned {}: {}", provider, operation, status, body.trim());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::UNAUTHORIZED
    {
        StorageError::Unavailable(message)
    } else {
        StorageError::BackendError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = status_error("cloud drive", "upload", StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, StorageError::Unavailable(_)));

        let err = status_error("cloud drive", "upload", StatusCode::FORBIDDEN, "{\"error\":\"forbidden\"}");
        assert!(matches!(err, StorageError::BackendError(_)));
        assert!(err.to_string().contains("403"));
    }
}
