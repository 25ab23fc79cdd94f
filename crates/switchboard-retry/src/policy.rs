//! Exhaustion rules and backoff timing for failed sends.
//!
//! A failure is recorded first, then [`RetryContext::decide_retry`] decides
//! whether the item stays pending (and when it is next due for an automatic
//! retry) or is given up on.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SendError;

/// Retry limits and backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failed attempts after which an item is exhausted.
    pub max_attempts: u32,

    /// Maximum time since the first failure during which retries continue.
    pub max_retry_window: Option<Duration>,

    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Maximum delay between automatic retries.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied to each delay.
    pub jitter_factor: f64,

    /// How delays grow with attempts.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_retry_window: Some(Duration::from_secs(24 * 60 * 60)),
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            jitter_factor: 0.1,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed,
    /// Delay doubles each attempt.
    Exponential,
    /// Delay grows by the base amount each attempt.
    Linear,
}

/// Outcome of evaluating the policy after a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the item pending; it is due for automatic retry at the given time.
    Retry {
        /// Earliest time for the next automatic attempt
        next_attempt_at: DateTime<Utc>,
    },
    /// Exhaust the item.
    GiveUp {
        /// Why retries stopped
        reason: String,
    },
}

/// Inputs to a retry decision for one failed attempt.
#[derive(Debug, Clone)]
pub struct RetryContext<'a> {
    /// Failed attempts so far, including this one.
    pub attempts: u32,
    /// Error of this attempt.
    pub error: &'a SendError,
    /// When the item first failed.
    pub first_failed_at: DateTime<Utc>,
    /// When this attempt failed.
    pub failed_at: DateTime<Utc>,
    /// Policy to apply.
    pub policy: &'a RetryPolicy,
}

impl<'a> RetryContext<'a> {
    /// Creates a decision context.
    pub fn new(
        attempts: u32,
        error: &'a SendError,
        first_failed_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self { attempts, error, first_failed_at, failed_at, policy }
    }

    /// Decides whether to keep retrying.
    ///
    /// Gives up when the attempt limit is reached, when the error is not
    /// retryable, or when the retry window since the first failure has
    /// elapsed. Otherwise schedules the next automatic attempt, honoring a
    /// gateway `Retry-After`.
    pub fn decide_retry(&self) -> RetryDecision {
        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) reached", self.policy.max_attempts),
            };
        }

        if !self.error.is_retryable() {
            return RetryDecision::GiveUp { reason: format!("non-retryable error: {}", self.error) };
        }

        if let Some(window) = self.policy.max_retry_window {
            let elapsed = (self.failed_at - self.first_failed_at).to_std().unwrap_or_default();
            if elapsed >= window {
                return RetryDecision::GiveUp {
                    reason: format!("retry window of {}s elapsed", window.as_secs()),
                };
            }
        }

        let Ok(delay) = chrono::Duration::from_std(self.calculate_delay()) else {
            return RetryDecision::GiveUp {
                reason: "retry delay duration out of range".to_string(),
            };
        };

        RetryDecision::Retry { next_attempt_at: self.failed_at + delay }
    }

    /// Delay until the next automatic attempt.
    pub fn calculate_delay(&self) -> Duration {
        if let Some(retry_after_seconds) = self.error.retry_after_seconds() {
            return Duration::from_secs(retry_after_seconds);
        }

        let base_delay = match self.policy.backoff_strategy {
            BackoffStrategy::Fixed => self.policy.base_delay,
            BackoffStrategy::Linear => self.policy.base_delay * self.attempts.max(1),
            BackoffStrategy::Exponential => {
                let exponent = self.attempts.saturating_sub(1).min(20);
                self.policy.base_delay * 2_u32.saturating_pow(exponent)
            },
        };

        let capped_delay = base_delay.min(self.policy.max_delay);
        apply_jitter(capped_delay, self.policy.jitter_factor).min(self.policy.max_delay)
    }
}

/// Randomizes `duration` by up to `±jitter_factor`.
pub fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let jitter_range = duration.as_secs_f64() * jitter_factor.clamp(0.0, 1.0);
    let jitter_offset = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::from_secs_f64((duration.as_secs_f64() + jitter_offset).max(0.0))
}
