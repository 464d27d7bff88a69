//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Retryable;

/// Upper bound for policies built from an initial delay and a factor alone.
const MAX_BACKOFF: Duration = Duration::from_secs(3_600);

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };

                let mut delay =
                    Duration::try_from_secs_f64(capped_seconds.max(0.0)).unwrap_or(max);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Declarative retry settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
            jitter: false,
        }
    }
}

/// Wraps a fallible operation with `max_retries` retries.
///
/// Total attempts = `max_retries + 1`. Only errors reporting
/// [`Retryable::is_retryable`] are retried; anything else is returned at once.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
    /// HTTP statuses treated as transient by connectors.
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(settings.initial_delay_ms),
                factor: settings.backoff_factor,
                max: Duration::from_millis(settings.max_delay_ms),
                jitter: settings.jitter,
            },
            retry_on_status: default_retry_statuses(),
        }
    }
}

fn default_retry_statuses() -> Vec<u16> {
    vec![408, 429, 500, 502, 503, 504]
}

impl RetryPolicy {
    /// Exponential policy: the delay before retry `n` is `initial_delay * backoff_factor^n`.
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential {
                base: initial_delay,
                factor: backoff_factor,
                max: MAX_BACKOFF,
                jitter: false,
            },
            retry_on_status: default_retry_statuses(),
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            retry_on_status: default_retry_statuses(),
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO, 0)
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status) || (500..600).contains(&status)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or exhausts its retries. The terminal error is always returned.
    pub fn run<T, E, F>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retryable = error.is_retryable();
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        retryable,
                        error = %error,
                        "attempt failed"
                    );
                    if !retryable || attempt >= self.max_retries {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    struct Flaky(u32);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky failure #{}", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0 != u32::MAX
        }
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
    }

    #[test]
    fn test_exponential_backoff_with_jitter_stays_in_band() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for attempt in 0..5 {
            let delay_ms = backoff.delay(attempt).as_millis() as f64;
            let expected = (100.0 * 2_f64.powi(attempt as i32)).min(1000.0);
            assert!(delay_ms >= expected * 0.49, "attempt={attempt}, delay_ms={delay_ms}");
            assert!(delay_ms <= expected * 1.51, "attempt={attempt}, delay_ms={delay_ms}");
        }
    }

    #[test]
    fn test_default_settings_match_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert!(policy.should_retry_status(429));
        assert!(policy.should_retry_status(503));
        assert!(!policy.should_retry_status(404));
    }

    #[test]
    fn test_non_retryable_error_is_returned_immediately() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(Duration::ZERO, 5);

        let result: Result<(), Flaky> = policy.run("fatal", || {
            calls.set(calls.get() + 1);
            Err(Flaky(u32::MAX))
        });

        assert_eq!(result, Err(Flaky(u32::MAX)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_no_retry_makes_one_attempt() {
        let calls = Cell::new(0);
        let result: Result<(), Flaky> = RetryPolicy::no_retry().run("once", || {
            calls.set(calls.get() + 1);
            Err(Flaky(1))
        });
        assert_eq!(result, Err(Flaky(1)));
        assert_eq!(calls.get(), 1);
    }
}
