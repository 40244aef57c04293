//! Bounded retry executor with backoff and jitter.
//!
//! Generic over the operation: it knows nothing about locks. The door
//! orchestrator wraps a single lock attempt in it; anything else that needs
//! "try, wait, try again, give up after N" can use it the same way.
//!
//! ## Delay sequence
//!
//! ```text
//! fixed:        base, base, base, ...
//! exponential:  min(2*base, max), min(4*base, max), ...
//! ```
//!
//! The doubling happens before the first wait, so an exponential policy's
//! first pause is already twice the base delay. With jitter each pause is
//! moved by a uniform offset of up to ±10% and never drops below 100 ms.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Fraction of the delay used as the jitter half-width.
const JITTER_RATIO: f64 = 0.1;

/// Shortest pause after jitter is applied.
const MIN_JITTERED_DELAY: Duration = Duration::from_millis(100);

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub exponential: bool,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Constant delay between attempts, no jitter.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            exponential: false,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to use after `current`, before jitter.
    pub fn next_delay(&self, current: Duration) -> Duration {
        if self.exponential {
            current.saturating_mul(2).min(self.max_delay)
        } else {
            self.base_delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            exponential: true,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T, E> {
    /// Attempts actually made (1-indexed count).
    pub attempts: u32,
    /// The successful value or the last error seen.
    pub result: Result<T, E>,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn last_error(&self) -> Option<&E> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

impl<T, E: Display> Display for RetryOutcome<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.result {
            Ok(_) => write!(f, "Success after {} attempt(s)", self.attempts),
            Err(e) => write!(f, "Failed after {} attempt(s): {e}", self.attempts),
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
pub async fn execute_with_retry<T, E, F, Fut>(op: F, policy: &RetryPolicy) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    execute_with_retry_if(op, policy, |_| true).await
}

/// Like [`execute_with_retry`], but stops early when `should_retry` returns
/// false for an error. The attempt that produced that error still counts.
pub async fn execute_with_retry_if<T, E, F, Fut, P>(
    mut op: F,
    policy: &RetryPolicy,
    should_retry: P,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts();
    let mut current_delay = policy.base_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "operation succeeded after retry");
                }
                return RetryOutcome {
                    attempts: attempt,
                    result: Ok(value),
                };
            }
            Err(err) => err,
        };

        if attempt >= max_attempts {
            error!(attempts = attempt, error = %err, "operation failed, retries exhausted");
            return RetryOutcome {
                attempts: attempt,
                result: Err(err),
            };
        }

        if !should_retry(&err) {
            warn!(attempt, error = %err, "operation failed with non-retryable error");
            return RetryOutcome {
                attempts: attempt,
                result: Err(err),
            };
        }

        current_delay = policy.next_delay(current_delay);
        let wait = if policy.jitter {
            jittered(current_delay)
        } else {
            current_delay
        };

        warn!(
            attempt,
            max_attempts,
            retry_in_secs = wait.as_secs_f64(),
            error = %err,
            "operation failed, retrying"
        );

        tokio::time::sleep(wait).await;
    }
}

/// Perturb `delay` by a uniform offset within ±10%, floored at 100 ms.
pub fn jittered(delay: Duration) -> Duration {
    let secs = delay.as_secs_f64();
    let spread = secs * JITTER_RATIO;
    let offset = if spread > 0.0 {
        rand::thread_rng().gen_range(-spread..=spread)
    } else {
        0.0
    };
    Duration::try_from_secs_f64((secs + offset).max(MIN_JITTERED_DELAY.as_secs_f64()))
        .unwrap_or(Duration::MAX)
}
