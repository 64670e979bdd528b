//! Retry policies and field-level override resolution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Concrete retry numbers for a single call.
///
/// Delays follow capped exponential backoff with symmetric jitter:
///
/// ```text
/// capped = min(base_delay * 2^attempt, max_delay)
/// delay  = max(0, capped + uniform(-1, 1) * jitter_ratio * capped)
/// ```
///
/// A server-provided `Retry-After` hint replaces the formula entirely and is
/// only capped at `max_delay` (see [`RetryPolicy::delay_for`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. `2` means up to 3 attempts total.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any computed or server-provided delay.
    pub max_delay: Duration,
    /// Jitter as a fraction of the capped delay, within `[0, 1]`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    /// Defaults:
    /// - `max_retries`: 2
    /// - `base_delay`: 300ms
    /// - `max_delay`: 5s
    /// - `jitter_ratio`: 0.2
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Merge overrides into this policy.
    ///
    /// Each field is taken from `overrides` only when present and valid;
    /// otherwise the current value is kept.
    pub fn apply(&self, overrides: &RetryOverrides) -> RetryPolicy {
        let mut policy = *self;

        if let Some(max_retries) = overrides.max_retries.filter(|v| *v >= 0) {
            policy.max_retries = u32::try_from(max_retries).unwrap_or(u32::MAX);
        }
        if let Some(ms) = overrides.base_delay_ms.and_then(valid_millis) {
            policy.base_delay = ms;
        }
        if let Some(ms) = overrides.max_delay_ms.and_then(valid_millis) {
            policy.max_delay = ms;
        }
        if let Some(ratio) = overrides
            .jitter_ratio
            .filter(|r| r.is_finite() && (0.0..=1.0).contains(r))
        {
            policy.jitter_ratio = ratio;
        }

        policy
    }

    /// Delay before retrying after a failed `attempt` (0-based).
    ///
    /// A `retry_after` hint takes precedence over the backoff formula and is
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay),
            None => self.backoff(attempt, rand::random::<f64>() * 2.0 - 1.0),
        }
    }

    /// Exponential backoff for `attempt` with a jitter sample in `[-1, 1]`.
    pub fn backoff(&self, attempt: u32, sample: f64) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(64) as i32);
        let capped = exponential.min(max);

        let jitter = capped * self.jitter_ratio * sample.clamp(-1.0, 1.0);
        let delay = (capped + jitter).max(0.0);

        if delay.is_finite() {
            Duration::from_nanos((delay * 1e9).round() as u64)
        } else {
            self.max_delay
        }
    }
}

fn valid_millis(ms: f64) -> Option<Duration> {
    (ms.is_finite() && ms >= 0.0).then(|| Duration::from_nanos((ms * 1e6).round() as u64))
}

/// Raw, possibly invalid policy overrides.
///
/// Values come from configuration and per-call options as plain numbers;
/// invalid ones (negative, NaN, infinite, jitter outside `[0, 1]`) are
/// ignored field by field during [`RetryPolicy::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOverrides {
    /// Retries after the initial attempt.
    pub max_retries: Option<i64>,
    /// Base delay in milliseconds.
    pub base_delay_ms: Option<f64>,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: Option<f64>,
    /// Jitter ratio.
    pub jitter_ratio: Option<f64>,
}

impl RetryOverrides {
    /// Empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry count.
    pub fn max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Override the base delay in milliseconds.
    pub fn base_delay_ms(mut self, ms: f64) -> Self {
        self.base_delay_ms = Some(ms);
        self
    }

    /// Override the maximum delay in milliseconds.
    pub fn max_delay_ms(mut self, ms: f64) -> Self {
        self.max_delay_ms = Some(ms);
        self
    }

    /// Override the jitter ratio.
    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = Some(ratio);
        self
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Which override set a call resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryClass {
    /// Only the `default` overrides.
    Default,
    /// Safe methods (`GET`, `HEAD`, `OPTIONS`).
    Reads,
    /// Everything else.
    Writes,
}

impl RetryClass {
    /// Classify an HTTP method name (case-insensitive).
    pub fn for_method(method: &str) -> Self {
        if ["GET", "HEAD", "OPTIONS"]
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
        {
            RetryClass::Reads
        } else {
            RetryClass::Writes
        }
    }
}

/// Override sets for the three retry classes.
///
/// Resolution order is built-in defaults, then `default`, then the class set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    /// Applied to every class.
    pub default: RetryOverrides,
    /// Applied on top of `default` for reads.
    pub reads: RetryOverrides,
    /// Applied on top of `default` for writes.
    pub writes: RetryOverrides,
}

impl RetryPolicies {
    /// Resolve the concrete policy for `class`.
    pub fn resolve(&self, class: RetryClass) -> RetryPolicy {
        let base = RetryPolicy::default().apply(&self.default);
        match class {
            RetryClass::Default => base,
            RetryClass::Reads => base.apply(&self.reads),
            RetryClass::Writes => base.apply(&self.writes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(300));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert_eq!(policy.jitter_ratio, 0.2);
    }

    #[test]
    fn test_invalid_overrides_fall_back_per_field() {
        let overrides = RetryOverrides {
            max_retries: Some(-1),
            base_delay_ms: Some(f64::NAN),
            max_delay_ms: Some(1_000.0),
            jitter_ratio: Some(1.5),
        };

        let policy = RetryPolicy::default().apply(&overrides);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(300));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
        assert_eq!(policy.jitter_ratio, 0.2);
    }

    #[test]
    fn test_class_overrides_layer_on_default() {
        let policies = RetryPolicies {
            default: RetryOverrides::new().max_retries(4).base_delay_ms(100.0),
            reads: RetryOverrides::new().max_delay_ms(900.0),
            writes: RetryOverrides::new().max_retries(0),
        };

        let reads = policies.resolve(RetryClass::Reads);
        assert_eq!(reads.max_retries, 4);
        assert_eq!(reads.base_delay, Duration::from_millis(100));
        assert_eq!(reads.max_delay, Duration::from_millis(900));

        let writes = policies.resolve(RetryClass::Writes);
        assert_eq!(writes.max_retries, 0);
        assert_eq!(writes.base_delay, Duration::from_millis(100));

        let default = policies.resolve(RetryClass::Default);
        assert_eq!(default.max_retries, 4);
        assert_eq!(default.max_delay, Duration::from_secs(5));
    }

    #[rstest]
    #[case("GET", RetryClass::Reads)]
    #[case("head", RetryClass::Reads)]
    #[case("Options", RetryClass::Reads)]
    #[case("POST", RetryClass::Writes)]
    #[case("delete", RetryClass::Writes)]
    #[case("PUT", RetryClass::Writes)]
    fn test_class_for_method(#[case] method: &str, #[case] expected: RetryClass) {
        assert_eq!(RetryClass::for_method(method), expected);
    }

    #[test]
    fn test_backoff_without_jitter_doubles_until_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(700),
            jitter_ratio: 0.0,
        };

        assert_eq!(policy.backoff(0, 0.9), Duration::from_millis(100));
        assert_eq!(policy.backoff(1, 0.9), Duration::from_millis(200));
        assert_eq!(policy.backoff(2, 0.9), Duration::from_millis(400));
        assert_eq!(policy.backoff(3, 0.9), Duration::from_millis(700));
        assert_eq!(policy.backoff(40, 0.9), Duration::from_millis(700));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(10),
            jitter_ratio: 0.5,
        };

        assert_eq!(policy.backoff(0, -1.0), Duration::from_millis(500));
        assert_eq!(policy.backoff(0, 1.0), Duration::from_millis(1_500));
    }

    #[test]
    fn test_retry_after_takes_precedence_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2_000),
            jitter_ratio: 0.5,
        };

        assert_eq!(
            policy.delay_for(0, Some(Duration::from_millis(5_000))),
            Duration::from_millis(2_000)
        );
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_millis(750))),
            Duration::from_millis(750)
        );
        assert_eq!(policy.delay_for(1, Some(Duration::ZERO)), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_backoff_never_exceeds_jittered_cap(
            attempt in 0u32..100,
            sample in -1.0f64..=1.0,
            jitter in 0.0f64..=1.0,
        ) {
            let policy = RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(3_000),
                jitter_ratio: jitter,
            };
            let delay = policy.backoff(attempt, sample);
            prop_assert!(delay.as_secs_f64() <= 3.0 * (1.0 + jitter) + 1e-9);
        }
    }
}
