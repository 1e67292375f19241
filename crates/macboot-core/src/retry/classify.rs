//! Classify HTTP status and curl errors into fetch failure reasons.

use super::error::{FetchFailure, TransferError};

/// Classify an HTTP status code. Every non-2xx status counts as a failed connection
/// to the resource; 404 is retried like any other status.
pub fn classify_http_status(_code: u32) -> FetchFailure {
    FetchFailure::ConnectionFailed
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> FetchFailure {
    if e.is_operation_timedout() {
        return FetchFailure::Timeout;
    }
    FetchFailure::ConnectionFailed
}

/// Classify a transfer error. `None` means the error is not retryable.
pub fn classify(e: &TransferError) -> Option<FetchFailure> {
    match e {
        TransferError::Curl(ce) => Some(classify_curl_error(ce)),
        TransferError::Http(code) => Some(classify_http_status(*code)),
        TransferError::Empty => Some(FetchFailure::EmptyResult),
        TransferError::Storage(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_statuses_are_connection_failures() {
        assert_eq!(classify_http_status(404), FetchFailure::ConnectionFailed);
        assert_eq!(classify_http_status(503), FetchFailure::ConnectionFailed);
    }

    #[test]
    fn empty_body_is_empty_result() {
        assert_eq!(classify(&TransferError::Empty), Some(FetchFailure::EmptyResult));
    }

    #[test]
    fn storage_errors_are_not_retryable() {
        let e = TransferError::Storage(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(classify(&e), None);
    }
}
