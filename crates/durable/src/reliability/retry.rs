//! Retry policy and backoff evaluation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serde_util::duration_millis;

/// Invalid retry policy configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryPolicyError {
    #[error("backoff coefficient must be >= 1.0, got {0}")]
    InvalidCoefficient(f64),

    #[error("maximum interval {max:?} is shorter than initial interval {initial:?}")]
    MaxIntervalBelowInitial { initial: Duration, max: Duration },
}

/// Configuration for activity retries
///
/// `maximum_attempts = 0` means unbounded attempts and
/// `maximum_interval = 0` means the backoff is never capped.
///
/// # Example
///
/// ```
/// use relay_durable::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_maximum_attempts(5)
///     .with_initial_interval(Duration::from_secs(1))
///     .with_maximum_interval(Duration::from_secs(60));
///
/// // Second attempt after 2 seconds, third after 4 seconds, fourth after 8...
/// assert_eq!(policy.interval_for_attempt(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Base interval; attempt n waits `initial_interval × backoff_coefficient^(n − 1)`
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Backoff multiplier (1.0 for a fixed delay)
    pub backoff_coefficient: f64,

    /// Upper bound on any single delay (zero = unbounded)
    #[serde(with = "duration_millis")]
    pub maximum_interval: Duration,

    /// Maximum number of attempts including the first (zero = unbounded)
    pub maximum_attempts: u32,

    /// Failure types that are never retried
    #[serde(default)]
    pub non_retryable_error_types: Vec<String>,
}

/// Outcome of consulting the policy after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule the next attempt after this delay
    Backoff(Duration),

    /// Do not retry
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `maximum_attempts` reached
    AttemptsExhausted,

    /// The next attempt could not start before schedule-to-close expires
    ScheduleToCloseExceeded,

    /// The failure was marked non-retryable or its type is excluded
    NonRetryable,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttemptsExhausted => write!(f, "attempts exhausted"),
            Self::ScheduleToCloseExceeded => write!(f, "schedule-to-close exceeded"),
            Self::NonRetryable => write!(f, "non-retryable failure"),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Exponential backoff with sensible defaults
    ///
    /// - unbounded attempts
    /// - 1 second initial interval
    /// - 100 second max interval
    /// - 2x backoff coefficient
    pub fn exponential() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 0,
            non_retryable_error_types: vec![],
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            maximum_interval: Duration::ZERO,
            maximum_attempts: 1,
            non_retryable_error_types: vec![],
        }
    }

    /// Fixed intervals, no growth
    pub fn fixed(interval: Duration, maximum_attempts: u32) -> Self {
        Self {
            initial_interval: interval,
            backoff_coefficient: 1.0,
            maximum_interval: interval,
            maximum_attempts,
            non_retryable_error_types: vec![],
        }
    }

    pub fn with_maximum_attempts(mut self, maximum_attempts: u32) -> Self {
        self.maximum_attempts = maximum_attempts;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    /// Add a non-retryable failure type
    pub fn with_non_retryable_error(mut self, error_type: impl Into<String>) -> Self {
        self.non_retryable_error_types.push(error_type.into());
        self
    }

    /// Reject policies the evaluator cannot honor
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if self.backoff_coefficient.is_nan() || self.backoff_coefficient < 1.0 {
            return Err(RetryPolicyError::InvalidCoefficient(self.backoff_coefficient));
        }
        if !self.maximum_interval.is_zero() && self.maximum_interval < self.initial_interval {
            return Err(RetryPolicyError::MaxIntervalBelowInitial {
                initial: self.initial_interval,
                max: self.maximum_interval,
            });
        }
        Ok(())
    }

    /// Delay before `attempt` (1-based, the attempt about to be scheduled)
    ///
    /// `initial_interval × backoff_coefficient^(attempt − 1)`, capped by
    /// `maximum_interval` unless that is zero.
    pub fn interval_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let raw = Duration::try_from_secs_f64(base).unwrap_or(Duration::MAX);

        if self.maximum_interval.is_zero() {
            raw
        } else {
            raw.min(self.maximum_interval)
        }
    }

    /// Decide whether `attempt` should be scheduled, and after how long
    ///
    /// `elapsed` is the time since the first attempt was scheduled and
    /// `schedule_to_close` the overall budget, when one is set.
    pub fn evaluate(
        &self,
        attempt: u32,
        elapsed: Duration,
        schedule_to_close: Option<Duration>,
    ) -> RetryDecision {
        if self.maximum_attempts > 0 && attempt > self.maximum_attempts {
            return RetryDecision::Stop(StopReason::AttemptsExhausted);
        }

        let interval = self.interval_for_attempt(attempt);
        if let Some(budget) = schedule_to_close {
            if elapsed.saturating_add(interval) > budget {
                return RetryDecision::Stop(StopReason::ScheduleToCloseExceeded);
            }
        }

        RetryDecision::Backoff(interval)
    }

    /// Check if a failure type may be retried
    pub fn should_retry(&self, error_type: Option<&str>) -> bool {
        match error_type {
            Some(error_type) => !self
                .non_retryable_error_types
                .iter()
                .any(|t| t == error_type),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exponential_defaults() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.maximum_attempts, 0);
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.backoff_coefficient, 2.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(
            policy.evaluate(2, Duration::ZERO, None),
            RetryDecision::Stop(StopReason::AttemptsExhausted)
        );
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy::fixed(Duration::from_secs(60), 0);

        assert_eq!(policy.interval_for_attempt(2), Duration::from_secs(60));
        assert_eq!(policy.interval_for_attempt(3), Duration::from_secs(60));
        assert_eq!(policy.interval_for_attempt(50), Duration::from_secs(60));
    }

    #[test]
    fn test_coefficient_one_without_cap_is_constant() {
        let policy = RetryPolicy::exponential()
            .with_backoff_coefficient(1.0)
            .with_maximum_interval(Duration::ZERO)
            .with_initial_interval(Duration::from_secs(60));

        assert_eq!(policy.interval_for_attempt(2), Duration::from_secs(60));
        assert_eq!(policy.interval_for_attempt(9), Duration::from_secs(60));
    }

    #[test]
    fn test_interval_for_attempt() {
        let policy = RetryPolicy::exponential();

        assert_eq!(policy.interval_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.interval_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.interval_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.interval_for_attempt(4), Duration::from_secs(8));
    }

    #[test]
    fn test_max_interval_cap() {
        let policy = RetryPolicy::exponential().with_maximum_interval(Duration::from_secs(5));
        assert_eq!(policy.interval_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_interval_saturates() {
        let policy = RetryPolicy::exponential().with_maximum_interval(Duration::ZERO);
        assert_eq!(policy.interval_for_attempt(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_attempt_limit() {
        let policy = RetryPolicy::exponential().with_maximum_attempts(3);

        assert!(matches!(
            policy.evaluate(3, Duration::ZERO, None),
            RetryDecision::Backoff(_)
        ));
        assert_eq!(
            policy.evaluate(4, Duration::ZERO, None),
            RetryDecision::Stop(StopReason::AttemptsExhausted)
        );
    }

    #[test]
    fn test_schedule_to_close_budget() {
        let policy = RetryPolicy::fixed(Duration::from_secs(60), 0);

        assert_eq!(
            policy.evaluate(2, Duration::from_secs(30), Some(Duration::from_secs(120))),
            RetryDecision::Backoff(Duration::from_secs(60))
        );
        assert_eq!(
            policy.evaluate(2, Duration::from_secs(90), Some(Duration::from_secs(120))),
            RetryDecision::Stop(StopReason::ScheduleToCloseExceeded)
        );
    }

    #[test]
    fn test_validate() {
        let bad = RetryPolicy::exponential().with_backoff_coefficient(0.5);
        assert_eq!(bad.validate(), Err(RetryPolicyError::InvalidCoefficient(0.5)));

        let nan = RetryPolicy::exponential().with_backoff_coefficient(f64::NAN);
        assert!(nan.validate().is_err());

        let inverted = RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(10))
            .with_maximum_interval(Duration::from_secs(1));
        assert!(matches!(
            inverted.validate(),
            Err(RetryPolicyError::MaxIntervalBelowInitial { .. })
        ));
    }

    #[test]
    fn test_non_retryable_errors() {
        let policy = RetryPolicy::exponential()
            .with_non_retryable_error("INVALID_INPUT")
            .with_non_retryable_error("NOT_FOUND");

        assert!(!policy.should_retry(Some("INVALID_INPUT")));
        assert!(!policy.should_retry(Some("NOT_FOUND")));
        assert!(policy.should_retry(Some("TIMEOUT")));
        assert!(policy.should_retry(None));
    }

    #[test]
    fn test_serialization() {
        let policy = RetryPolicy::exponential()
            .with_maximum_attempts(10)
            .with_non_retryable_error("TEST");

        let json = serde_json::to_string(&policy).unwrap();
        let parsed: RetryPolicy = serde_json::from_str(&json).unwrap();

        assert_eq!(policy, parsed);
    }

    fn arb_policy() -> impl Strategy<Value = RetryPolicy> {
        (0u64..10_000, 1.0f64..4.0, 0u64..1_000_000, 0u32..20).prop_map(
            |(initial_ms, coefficient, max_ms, max_attempts)| RetryPolicy {
                initial_interval: Duration::from_millis(initial_ms),
                backoff_coefficient: coefficient,
                maximum_interval: if max_ms == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(initial_ms.max(max_ms))
                },
                maximum_attempts: max_attempts,
                non_retryable_error_types: vec![],
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_interval_non_decreasing(policy in arb_policy(), attempt in 1u32..200) {
            prop_assert!(policy.interval_for_attempt(attempt) <= policy.interval_for_attempt(attempt + 1));
        }

        #[test]
        fn prop_interval_never_exceeds_cap(policy in arb_policy(), attempt in 1u32..500) {
            prop_assume!(!policy.maximum_interval.is_zero());
            prop_assert!(policy.interval_for_attempt(attempt) <= policy.maximum_interval);
        }

        #[test]
        fn prop_backoff_respects_budget(
            policy in arb_policy(),
            attempt in 2u32..50,
            elapsed_ms in 0u64..1_000_000,
            budget_ms in 0u64..1_000_000,
        ) {
            let elapsed = Duration::from_millis(elapsed_ms);
            let budget = Duration::from_millis(budget_ms);
            if let RetryDecision::Backoff(delay) = policy.evaluate(attempt, elapsed, Some(budget)) {
                prop_assert!(elapsed + delay <= budget);
            }
        }
    }
}
