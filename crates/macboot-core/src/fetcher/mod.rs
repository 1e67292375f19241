//! Retrying fetcher: download one URL to a local path with bounded attempts.
//!
//! Each attempt streams into `<destination>.part`. An attempt only counts as a
//! success when the transfer finished within the timeouts and produced a
//! non-empty file; the part file is then renamed onto `destination`. Failed
//! attempts leave nothing behind. Trying fallback URLs is the caller's job.

mod curl;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::retry::{self, FetchFailure, RetryExhausted, RetryPolicy, TransferError};
use crate::storage::{self, PartFile};

pub use self::curl::CurlTransfer;

/// Connect and whole-transfer timeouts for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeouts {
    pub connect: Duration,
    pub total: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            total: Duration::from_secs(900),
        }
    }
}

/// Everything a fetch needs besides the URL and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    pub retry: RetryPolicy,
    pub timeouts: FetchTimeouts,
}

/// One network transfer attempt, writing the body into `part`.
///
/// Implemented with libcurl in production; tests substitute scripted transfers.
pub trait Transfer: Send + Sync {
    fn transfer(
        &self,
        url: &str,
        part: &mut PartFile,
        timeouts: &FetchTimeouts,
    ) -> Result<(), TransferError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),
    #[error("{reason} after {attempts} attempt(s): {detail}")]
    Failed {
        reason: FetchFailure,
        attempts: u32,
        detail: String,
    },
    #[error("cannot write {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Attempts made before giving up (0 when the request was rejected up front).
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::InvalidRequest(_) => 0,
            FetchError::Failed { attempts, .. } | FetchError::Storage { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Downloads resources with bounded retries and a fixed backoff.
#[derive(Clone)]
pub struct RetryingFetcher {
    transfer: Arc<dyn Transfer>,
}

impl RetryingFetcher {
    pub fn new(transfer: Arc<dyn Transfer>) -> Self {
        Self { transfer }
    }

    /// Fetcher backed by libcurl.
    pub fn curl() -> Self {
        Self::new(Arc::new(CurlTransfer::default()))
    }

    /// Fetch `url` into `destination`, overwriting it on success.
    /// Returns the number of attempts used.
    pub fn fetch(
        &self,
        url: &str,
        destination: &Path,
        opts: &FetchOptions,
    ) -> Result<u32, FetchError> {
        validate_request(url, opts)?;
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| FetchError::Storage {
                path: parent.to_path_buf(),
                attempts: 0,
                source,
            })?;
        }
        let temp = storage::temp_path(destination);

        let result = retry::run_with_retry(&opts.retry, |attempt| {
            tracing::debug!(url, attempt, dest = %destination.display(), "fetch attempt");
            let mut part = PartFile::create(&temp)?;
            self.transfer.transfer(url, &mut part, &opts.timeouts)?;
            let on_disk = std::fs::metadata(part.temp_path())?.len();
            if part.written() == 0 || on_disk == 0 {
                return Err(TransferError::Empty);
            }
            part.commit(destination)?;
            Ok(())
        });

        match result {
            Ok(attempts) => {
                tracing::info!(url, attempts, dest = %destination.display(), "fetched");
                Ok(attempts)
            }
            Err(RetryExhausted { error, attempts }) => {
                let _ = storage::remove_if_exists(&temp);
                tracing::warn!(url, attempts, "fetch failed: {}", error);
                Err(match (retry::classify(&error), error) {
                    (_, TransferError::Storage(source)) => FetchError::Storage {
                        path: temp,
                        attempts,
                        source,
                    },
                    (Some(reason), error) => FetchError::Failed {
                        reason,
                        attempts,
                        detail: error.to_string(),
                    },
                    (None, error) => FetchError::Failed {
                        reason: FetchFailure::ConnectionFailed,
                        attempts,
                        detail: error.to_string(),
                    },
                })
            }
        }
    }
}

fn validate_request(url: &str, opts: &FetchOptions) -> Result<(), FetchError> {
    if opts.retry.max_attempts < 1 {
        return Err(FetchError::InvalidRequest(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    let parsed = url::Url::parse(url)
        .map_err(|e| FetchError::InvalidRequest(format!("malformed URL {:?}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" | "file" => Ok(()),
        other => Err(FetchError::InvalidRequest(format!(
            "unsupported URL scheme {:?}",
            other
        ))),
    }
}
