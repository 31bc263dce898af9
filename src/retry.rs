//! Retry policy with bounded backoff
//!
//! Retrying is an explicit state transition: [`Attempts`] counts failures
//! against a [`RetryPolicy`] and answers with a [`RetryDecision`], so the
//! attempt ceiling and delay schedule can be tested without sleeping.

use crate::error::Error;
use crate::types::BackoffType;
use rand::Rng;
use std::time::Duration;

/// Backoff schedule and attempt ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Shape of the delay curve
    pub backoff: BackoffType,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Randomize each delay within its upper half
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffType::Exponential,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the attempt ceiling
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set backoff shape and bounds
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff = backoff;
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-based), before jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let delay = match self.backoff {
            BackoffType::Constant => self.initial_delay,
            BackoffType::Linear => self.initial_delay.saturating_mul(retry.saturating_add(1)),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(retry);
                self.initial_delay.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.max_delay)
    }

    /// Delay before retry number `retry`, with jitter applied if enabled
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let half = base / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    }

    /// Start counting attempts for one operation
    pub fn start(&self) -> Attempts<'_> {
        Attempts {
            policy: self,
            failures: 0,
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep, then try again
    Retry {
        /// Retry number (1-based)
        retry: u32,
        /// How long to wait first
        delay: Duration,
        /// The failure being retried
        error: Error,
    },
    /// Give up with this error
    Stop(Error),
}

/// Failure counter for one operation
#[derive(Debug)]
pub struct Attempts<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
}

impl Attempts<'_> {
    /// Number of failures seen so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Register a failure and decide whether to retry
    ///
    /// Non-retryable errors stop immediately and are returned unchanged.
    /// Retryable errors past the ceiling are wrapped in `RetriesExhausted`.
    pub fn on_failure(&mut self, error: Error) -> RetryDecision {
        self.failures += 1;
        if !error.is_retryable() {
            return RetryDecision::Stop(error);
        }
        if self.failures >= self.policy.max_attempts {
            return RetryDecision::Stop(Error::RetriesExhausted {
                attempts: self.failures,
                last: Box::new(error),
            });
        }
        RetryDecision::Retry {
            retry: self.failures,
            delay: self.policy.delay(self.failures - 1),
            error,
        }
    }
}
