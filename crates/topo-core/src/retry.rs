//! Re-resolve retry for serial conflicts
//!
//! A rejected serial means another writer got there first. The only safe
//! response is to read the store again, rebuild the mapping on top of what is
//! now there, re-sign and resubmit. [`RetryPolicy::execute_reresolving`] reruns
//! that whole closure, and only for [`TopologyError::ConcurrencyConflict`].
//! Every other failure, including an indeterminate transport failure, is
//! returned to the caller unchanged.

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear increase: delay * attempt
    Linear,
    /// Exponential increase: delay * 2^attempt
    Exponential,
    /// Exponential with up to 10% random jitter
    ExponentialWithJitter,
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (zero-based), capped at `max_delay`
    pub fn calculate_delay(
        &self,
        attempt: u32,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Duration {
        use rand::Rng;

        let delay = match self {
            BackoffStrategy::Fixed => initial_delay,
            BackoffStrategy::Linear => initial_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential => {
                initial_delay.saturating_mul(2u32.saturating_pow(attempt))
            }
            BackoffStrategy::ExponentialWithJitter => {
                let base = initial_delay.saturating_mul(2u32.saturating_pow(attempt));
                let jitter =
                    (base.as_millis() as f64 * 0.1 * rand::thread_rng().gen::<f64>()) as u64;
                base.saturating_add(Duration::from_millis(jitter))
            }
        };

        delay.min(max_delay)
    }
}

/// Bounded retry of whole resolve-build-sign-submit rounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
    /// How delays grow
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// Exponential backoff, three attempts
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Fixed delay, three attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: 3,
            initial_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Set total attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff strategy
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.strategy
            .calculate_delay(attempt, self.initial_delay, self.max_delay)
    }

    /// Run `round` until it succeeds, fails with a non-retryable error, or
    /// attempts run out.
    ///
    /// `round` receives the zero-based attempt number and must re-resolve
    /// serials from the store every time it is called.
    pub async fn execute_reresolving<F, Fut, T>(&self, mut round: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match round(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "Topology write succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.calculate_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Serial conflict, re-resolving before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(
                            attempts = attempt + 1,
                            "Giving up on topology write after repeated serial conflicts"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}
