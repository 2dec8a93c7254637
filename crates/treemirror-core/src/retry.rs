//! Bounded fixed-delay retry for async operations
//!
//! Remote connect and listing calls go through [`retry`]. Any error other
//! than cancellation is retried after a fixed delay until the attempt budget
//! is spent, at which point the last error is returned. Cancellation aborts
//! immediately, including while waiting between attempts.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::UpdateError;

/// Attempt budget and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy used for backend connect and listing calls: 2 attempts, 1 s apart
    pub const REMOTE: Self = Self {
        attempts: 2,
        delay: Duration::from_secs(1),
    };

    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::REMOTE
    }
}

/// Runs `f` until it succeeds, fails with cancellation, or the budget is spent.
///
/// A budget of 0 attempts behaves like 1.
pub async fn retry<F, Fut, T>(
    operation: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, UpdateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpdateError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let err = match f().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };
        if err.is_cancelled() {
            return Err(err);
        }
        if attempt >= attempts {
            warn!(operation, attempts, error = %err, "Retry budget exhausted");
            return Err(err);
        }

        warn!(
            operation,
            attempt,
            delay_ms = policy.delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}
