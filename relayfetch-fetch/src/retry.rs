//! Backoff between retries of the same backend.

use relayfetch_core::{ErrorClassification, ErrorType};
use std::time::Duration;

/// Default ceiling for attempt-scaled rate-limit waits.
pub const DEFAULT_RATE_LIMIT_CEILING: Duration = Duration::from_secs(300);

/// Default ceiling for any single wait.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// Turns a classification into a retry decision and a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Ceiling for rate-limit waits.
    pub rate_limit_ceiling: Duration,
    /// Ceiling for every wait.
    pub max_wait: Duration,
}

impl BackoffPolicy {
    /// Creates a policy with the given ceilings.
    pub fn new(rate_limit_ceiling: Duration, max_wait: Duration) -> Self {
        Self {
            rate_limit_ceiling,
            max_wait,
        }
    }

    /// Disables waiting altogether.
    pub fn no_wait() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Whether a backend that just failed its `attempt`-th call (0-based)
    /// gets another call.
    pub fn should_retry(classification: &ErrorClassification, attempt: u32) -> bool {
        classification.should_retry() && attempt < classification.max_retries()
    }

    /// Wait before the retry that follows the `attempt`-th call.
    ///
    /// Rate limits scale linearly with the attempt index up to
    /// `rate_limit_ceiling`; everything else waits the recommended time.
    pub fn delay_for_attempt(&self, classification: &ErrorClassification, attempt: u32) -> Duration {
        let base = classification.recommended_wait();
        let delay = match classification.error_type() {
            ErrorType::RateLimit => base
                .saturating_mul(attempt.saturating_add(1))
                .min(self.rate_limit_ceiling),
            _ => base,
        };
        delay.min(self.max_wait)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_CEILING, DEFAULT_MAX_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_scales_with_attempt() {
        let policy = BackoffPolicy::default();
        let c = ErrorClassification::rate_limit("429", Duration::from_secs(60), 3);

        assert_eq!(policy.delay_for_attempt(&c, 0), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(&c, 1), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(&c, 2), Duration::from_secs(180));
    }

    #[test]
    fn test_rate_limit_ceiling() {
        let policy = BackoffPolicy::default();
        let c = ErrorClassification::rate_limit("429", Duration::from_secs(120), 5);

        // Capped at 300 seconds
        assert_eq!(policy.delay_for_attempt(&c, 4), Duration::from_secs(300));
    }

    #[test]
    fn test_temporary_wait_is_fixed() {
        let policy = BackoffPolicy::default();
        let c = ErrorClassification::temporary("503", Duration::from_secs(5), 2);
        assert_eq!(policy.delay_for_attempt(&c, 0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(&c, 1), Duration::from_secs(5));
    }

    #[test]
    fn test_max_wait_caps_everything() {
        let policy = BackoffPolicy::new(Duration::from_secs(900), Duration::from_secs(10));
        let c = ErrorClassification::rate_limit("429", Duration::from_secs(60), 3);
        assert_eq!(policy.delay_for_attempt(&c, 2), Duration::from_secs(10));
    }

    #[test]
    fn test_should_retry_counts_from_zero() {
        let c = ErrorClassification::rate_limit("429", Duration::from_secs(60), 3);
        assert!(BackoffPolicy::should_retry(&c, 0));
        assert!(BackoffPolicy::should_retry(&c, 2));
        assert!(!BackoffPolicy::should_retry(&c, 3));

        let p = ErrorClassification::permanent("404");
        assert!(!BackoffPolicy::should_retry(&p, 0));
    }
}
