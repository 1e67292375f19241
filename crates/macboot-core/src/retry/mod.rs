//! Retry and backoff policy for fetches.
//!
//! This module classifies per-attempt transfer failures (timeouts, connection
//! failures, empty bodies) and applies a fixed backoff between attempts, so
//! the fetcher and any future caller share one policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::{FetchFailure, TransferError};
pub use policy::{RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryExhausted};
