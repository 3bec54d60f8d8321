//! Bounded retries for remote calls.
//!
//! Every remote call made by the reconciler goes through [`RetryPolicy::run`],
//! which applies a per-call deadline, retries transient failures with linear
//! backoff, and stops at the next call boundary once cancelled. A call that
//! has been issued always runs to completion or to its deadline, so the
//! caller learns the outcome of every mutation it started.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ApiError, ReconcileError, Result};

/// Default number of attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default base delay between attempts in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default per-call timeout in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Retry policy applied to remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; later attempts wait linearly longer.
    pub base_delay: Duration,
    /// Deadline for a single attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, call_timeout: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            call_timeout,
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub const fn no_retry(call_timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, call_timeout)
    }

    fn delay_for(&self, attempt: u32, throttle_secs: Option<u64>) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt);
        throttle_secs.map_or(linear, |secs| linear.max(Duration::from_secs(secs)))
    }

    /// Runs `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// - Non-transient errors are returned unchanged.
    /// - Transient errors on the last attempt are wrapped in
    ///   `ReconcileError::RetriesExhausted` when more than one attempt was made.
    /// - `ReconcileError::Cancelled` if `cancel` fires before an attempt or
    ///   during backoff. An attempt already in flight is not interrupted.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled {
                    operation: operation.to_string(),
                }
                .into());
            }

            attempt += 1;

            let error = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ApiError::Timeout {
                    operation: operation.to_string(),
                    after_ms: u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into(),
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= max_attempts {
                if max_attempts == 1 {
                    return Err(error);
                }
                warn!("{operation} failed after {attempt} attempts: {error}");
                return Err(ReconcileError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(error),
                }
                .into());
            }

            let delay = self.delay_for(attempt, error.retry_delay_secs());
            debug!(
                "{operation} attempt {attempt}/{max_attempts} failed ({error}), retrying in {delay:?}"
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(ReconcileError::Cancelled {
                        operation: operation.to_string(),
                    }
                    .into());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
