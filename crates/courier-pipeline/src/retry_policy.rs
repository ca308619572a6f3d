//! Classifies errors as transient vs terminal and computes retry delays.

use std::time::Duration;

use courier_common::CourierError;
use rand::Rng;

pub trait RetryPolicy: Send + Sync {
    fn max_retries(&self) -> u32;

    /// Whether `error` should be retried at the given zero-indexed `attempt`.
    fn should_retry(&self, error: Option<&CourierError>, attempt: u32) -> bool;

    /// The delay to wait before the next attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with a capped maximum delay and additive jitter.
///
/// `delay(attempt) = min(base_delay * 2^attempt + jitter, max_delay)`. When
/// `jitter_factor == 0`, the result is deterministic.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        assert!(base_delay <= max_delay, "base_delay must not exceed max_delay");
        assert!((0.0..=1.0).contains(&jitter_factor), "jitter_factor must be in [0, 1]");
        Self { max_retries, base_delay, max_delay, jitter_factor }
    }

    /// The default policy used by the event bus and the error-handling
    /// decorator when no explicit policy is configured: base 1s, max 30s,
    /// jitter 0.2, at most 3 retries.
    pub fn default_policy() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30), 0.2)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::default_policy()
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn should_retry(&self, error: Option<&CourierError>, attempt: u32) -> bool {
        let Some(error) = error else {
            return false;
        };
        if attempt >= self.max_retries {
            return false;
        }
        if error.is_critical() {
            return false;
        }
        error.is_transient()
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as f64;
        let exponential = base_millis * 2f64.powi(attempt as i32);

        let jitter_millis = if self.jitter_factor > 0.0 {
            let jitter_span = exponential * self.jitter_factor;
            rand::thread_rng().gen_range(0.0..=jitter_span)
        } else {
            0.0
        };

        let total_millis = (exponential + jitter_millis).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(total_millis.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_deterministic_with_zero_jitter() {
        let policy = ExponentialBackoff::new(5, Duration::from_secs(1), Duration::from_secs(30), 0.0);
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn delay_caps_at_max_delay() {
        let policy = ExponentialBackoff::new(10, Duration::from_secs(1), Duration::from_secs(30), 0.0);
        assert_eq!(policy.delay(10), Duration::from_secs(30));
    }

    #[test]
    fn should_retry_classifies_transient_and_critical() {
        let policy = ExponentialBackoff::default_policy();
        let transient = CourierError::TransientError("Timeout".into());
        let critical = CourierError::CriticalError("OutOfMemory".into());

        assert!(policy.should_retry(Some(&transient), 0));
        assert!(!policy.should_retry(Some(&critical), 0));
        assert!(!policy.should_retry(None, 0));
    }

    #[test]
    fn should_retry_false_at_or_beyond_max_retries() {
        let policy = ExponentialBackoff::new(2, Duration::from_millis(1), Duration::from_secs(1), 0.0);
        let transient = CourierError::TransientError("Timeout".into());
        assert!(policy.should_retry(Some(&transient), 1));
        assert!(!policy.should_retry(Some(&transient), 2));
    }

    #[test]
    fn inner_transient_cause_inside_handler_error_still_counts_transient() {
        let policy = ExponentialBackoff::default_policy();
        let wrapped = CourierError::HandlerError("wrapped cause: OperationCanceled".into());
        assert!(policy.should_retry(Some(&wrapped), 0));
    }
}
