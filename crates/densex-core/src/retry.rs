//! Bounded retries with per-attempt timeout and exponential backoff
//!
//! A [`RetryExecutor`] runs a zero-argument async operation up to
//! `max_attempts` times. Each attempt is bounded by `timeout`; a failed or
//! timed-out attempt that is not the last one is followed by a backoff of
//! `base_delay * 2^attempt`. No delay follows the final attempt.
//!
//! # Example
//!
//! ```ignore
//! use densex_core::{RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));
//! let body = RetryExecutor::new()
//!     .execute(&policy, || client.get(url).send())
//!     .await?;
//! ```

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Boxed error accepted from retried operations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// Errors
// ============================================================================

/// Why a single attempt failed
#[derive(Debug, Error)]
pub enum AttemptFailure {
    /// The attempt did not finish within the per-attempt timeout
    #[error("attempt timed out after {after:?}")]
    TimedOut {
        /// The timeout that elapsed
        after: Duration,
    },

    /// The operation returned an error
    #[error("attempt failed: {0}")]
    Failed(#[source] BoxError),
}

/// Terminal error of a retried operation
#[derive(Debug, Error)]
pub enum RetryError {
    /// The policy was rejected before any attempt was made
    #[error("invalid retry parameters: {reason}")]
    InvalidParameters {
        /// Which parameter was out of range
        reason: &'static str,
    },

    /// Every permitted attempt failed or timed out
    #[error("operation failed after retries")]
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// Failure of the last attempt
        #[source]
        last: AttemptFailure,
    },
}

impl RetryError {
    /// Number of attempts that were made (zero for rejected policies)
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::InvalidParameters { .. } => 0,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Failure of the final attempt, if any attempt ran
    #[must_use]
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            RetryError::InvalidParameters { .. } => None,
            RetryError::Exhausted { last, .. } => Some(last),
        }
    }

    /// Whether the final attempt ended in a timeout
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self.last_failure(), Some(AttemptFailure::TimedOut { .. }))
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Retry parameters for one call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt
    pub base_delay: Duration,
    /// Upper bound for a single attempt
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Create a policy (validated when executed)
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            timeout,
        }
    }

    /// Create a policy from seconds as found in config files.
    ///
    /// Negative, NaN or infinite values become zero durations so that
    /// validation rejects them.
    #[must_use]
    pub fn from_secs_f64(max_attempts: u32, base_delay_secs: f64, timeout_secs: f64) -> Self {
        Self::new(
            max_attempts,
            secs_or_zero(base_delay_secs),
            secs_or_zero(timeout_secs),
        )
    }

    /// Check the policy before any attempt is made
    pub fn validate(&self) -> Result<(), RetryError> {
        if self.max_attempts < 1 {
            return Err(RetryError::InvalidParameters {
                reason: "max_attempts must be at least 1",
            });
        }
        if self.base_delay.is_zero() {
            return Err(RetryError::InvalidParameters {
                reason: "base_delay must be positive",
            });
        }
        if self.timeout.is_zero() {
            return Err(RetryError::InvalidParameters {
                reason: "timeout must be positive",
            });
        }
        Ok(())
    }

    /// Backoff applied after the failed attempt with 0-based index `attempt`
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Delays a run in which every attempt fails would sleep through
    #[must_use]
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.backoff_delay(attempt))
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }
}

fn secs_or_zero(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

// ============================================================================
// Sleepers
// ============================================================================

/// Suspends the caller between attempts
#[async_trait]
pub trait Sleeper: Send + Sync + fmt::Debug {
    /// Wait for `delay` without blocking other tasks
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Records requested delays and returns immediately.
///
/// Clones share the same record.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sum of requested delays
    #[must_use]
    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(delay);
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Runs operations under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor {
    /// Executor that backs off on the tokio timer
    #[must_use]
    pub fn new() -> Self {
        Self::with_sleeper(TokioSleeper)
    }

    /// Executor with a custom sleeper
    #[must_use]
    pub fn with_sleeper(sleeper: impl Sleeper + 'static) -> Self {
        Self {
            sleeper: Arc::new(sleeper),
        }
    }

    /// Run `operation` until it succeeds or the policy is exhausted.
    ///
    /// Attempts run strictly one after another. A timed-out attempt is
    /// dropped (its late result is discarded) and counts as a failure.
    ///
    /// `operation` is invoked once per attempt, so each invocation must be
    /// safe to repeat. The executor cannot check this; callers retrying
    /// non-idempotent requests own the consequences.
    ///
    /// # Errors
    ///
    /// - [`RetryError::InvalidParameters`] if the policy is rejected; the
    ///   operation is never invoked.
    /// - [`RetryError::Exhausted`] once the last attempt fails, carrying that
    ///   attempt's failure as its source.
    pub async fn execute<T, E, Op, Fut>(
        &self,
        policy: &RetryPolicy,
        mut operation: Op,
    ) -> Result<T, RetryError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        policy.validate()?;

        let mut attempt: u32 = 0;
        loop {
            let failure = match tokio::time::timeout(policy.timeout, operation()).await {
                Ok(Ok(value)) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => AttemptFailure::Failed(e.into()),
                Err(_) => AttemptFailure::TimedOut {
                    after: policy.timeout,
                },
            };

            if attempt + 1 >= policy.max_attempts {
                error!(
                    attempts = policy.max_attempts,
                    error = %failure,
                    "operation failed after retries"
                );
                return Err(RetryError::Exhausted {
                    attempts: policy.max_attempts,
                    last: failure,
                });
            }

            let delay = policy.backoff_delay(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "attempt failed, backing off"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}
