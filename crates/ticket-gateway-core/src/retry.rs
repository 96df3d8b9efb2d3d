//! # Retry Policy Module
//!
//! Exponential backoff for outbound tool API calls.
//!
//! The default policy makes one initial attempt followed by up to three
//! retries, waiting 2s, 4s and 8s before each retry.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy configuration for exponential backoff
///
/// # Examples
///
/// ```rust
/// use ticket_gateway_core::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.calculate_delay(0), Duration::from_secs(2));
/// assert_eq!(policy.calculate_delay(1), Duration::from_secs(4));
/// assert_eq!(policy.calculate_delay(2), Duration::from_secs(8));
/// assert_eq!(policy.total_attempts(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Whether to add random jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            use_jitter: false,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy without jitter
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: false,
            jitter_percent: 0.25,
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Enable jitter with the given fraction (clamped to 0.0..=1.0)
    pub fn with_jitter(mut self, percent: f64) -> Self {
        self.use_jitter = true;
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay before retry number `attempt` (0-based)
    ///
    /// `delay = initial * multiplier^attempt`, capped at `max_delay`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::from_secs_f64(final_delay_secs)
    }

    /// Check if retry number `attempt` (0-based) is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Total number of attempts including the initial one
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts + 1
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }
}

/// State tracker for retry operations
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current retry attempt (0-based)
    pub attempt: u32,

    /// Total attempts made so far (including initial)
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            total_attempts: 1,
        }
    }

    /// Increment to next retry attempt
    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    /// Get next delay from policy
    pub fn get_delay(&self, policy: &RetryPolicy) -> Duration {
        policy.calculate_delay(self.attempt)
    }

    /// Check if we can retry with this policy
    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.attempt)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
