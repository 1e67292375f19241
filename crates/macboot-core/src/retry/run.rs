//! Retry loop: run a closure until success or policy says stop.

use super::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};

/// Last error of a retry loop together with how many attempts were made.
#[derive(Debug)]
pub struct RetryExhausted {
    pub error: TransferError,
    pub attempts: u32,
}

/// Runs `f` until it succeeds or the retry policy says to stop.
/// `f` receives the 1-based attempt number. On success returns the attempt count.
/// On retryable failure, sleeps for the backoff duration then tries again.
pub fn run_with_retry<F>(policy: &RetryPolicy, mut f: F) -> Result<u32, RetryExhausted>
where
    F: FnMut(u32) -> Result<(), TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(()) => return Ok(attempt),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return Err(RetryExhausted {
                            error: e,
                            attempts: attempt,
                        })
                    }
                    RetryDecision::RetryAfter(d) => {
                        tracing::warn!(attempt, error = %e, "attempt failed; retrying in {:?}", d);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}
