//! Per-attempt transfer error and the terminal failure reasons reported to callers.

use serde::Serialize;
use std::fmt;

/// Why a fetch ultimately failed. Reported together with the attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailure {
    /// The connect or total transfer timeout elapsed.
    Timeout,
    /// DNS, refused connection, reset, or a non-2xx HTTP status.
    ConnectionFailed,
    /// The transfer completed but produced no bytes.
    EmptyResult,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Timeout => write!(f, "timeout"),
            FetchFailure::ConnectionFailed => write!(f, "connection failed"),
            FetchFailure::EmptyResult => write!(f, "empty result"),
        }
    }
}

/// Error returned by a single transfer attempt.
/// Classified before deciding whether another attempt is made.
#[derive(Debug)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Transfer finished with a zero-byte body.
    Empty,
    /// Writing the local file failed (disk full, permission denied). Not retried.
    Storage(std::io::Error),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::Empty => write!(f, "transfer produced an empty file"),
            TransferError::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            TransferError::Http(_) | TransferError::Empty => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Storage(e)
    }
}
