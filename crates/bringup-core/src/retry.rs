//! Bounded retries with exponential backoff and a cleanup pass between
//! attempts, plus bounded readiness polling.

use crate::CoreError;
use bringup_schema::RetrySettings;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MAX_DELAY: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            settings.multiplier,
        )
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0)
    }

    /// Delay after the `failed`-th failed attempt (1-based).
    pub fn delay_after(&self, failed: u32) -> Duration {
        let exp = i32::try_from(failed.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exp);
        let secs = self.base_delay.as_secs_f64() * factor;
        if secs.is_finite() && secs < MAX_DELAY.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            MAX_DELAY
        }
    }
}

/// A value produced by [`with_retry`] and the attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// `cleanup` runs between attempts, never after the last one. A
/// [`CoreError::ResourceExhausted`] failure grants one extra attempt per call.
/// Non-retryable errors are returned as they are; otherwise the failure of
/// every attempt is collected into [`CoreError::RetriesExhausted`].
pub fn with_retry<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: impl FnMut(u32) -> Result<T, CoreError>,
    mut cleanup: impl FnMut() -> Result<(), CoreError>,
) -> Result<Retried<T>, CoreError> {
    let mut max_attempts = policy.max_attempts.max(1);
    let mut extra_granted = false;
    let mut failures = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{operation} succeeded on attempt {attempt}");
                }
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!("{operation}: attempt {attempt}/{max_attempts} failed: {e}");
                if matches!(e, CoreError::ResourceExhausted { .. }) && !extra_granted {
                    extra_granted = true;
                    max_attempts += 1;
                }
                failures.push(e.to_string());
            }
        }

        if attempt >= max_attempts {
            return Err(CoreError::RetriesExhausted {
                operation: operation.to_owned(),
                attempts: failures,
            });
        }

        if let Err(e) = cleanup() {
            if !e.is_retryable() {
                return Err(e);
            }
            warn!("{operation}: cleanup between attempts failed: {e}");
        }
        let delay = policy.delay_after(attempt);
        if !delay.is_zero() {
            debug!("{operation}: retrying in {}ms", delay.as_millis());
            thread::sleep(delay);
        }
    }
}

/// Poll `check` until it returns `true` or `timeout` elapses. `check` always
/// runs at least once; its errors count as "not yet". Returns whether the
/// condition was met.
pub fn poll_until(
    timeout: Duration,
    interval: Duration,
    what: &str,
    mut check: impl FnMut() -> Result<bool, CoreError>,
) -> Result<bool, CoreError> {
    let deadline = Instant::now() + timeout;
    loop {
        match check() {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) if e.is_connectivity() || !e.is_retryable() => return Err(e),
            Err(e) => debug!("{what}: check failed: {e}"),
        }
        let now = Instant::now();
        if now >= deadline {
            debug!("{what}: not ready after {}s", timeout.as_secs());
            return Ok(false);
        }
        thread::sleep(interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fail(msg: &str) -> CoreError {
        CoreError::CommandFailed {
            command: "docker pull x".to_owned(),
            detail: msg.to_owned(),
        }
    }

    #[test]
    fn fails_twice_then_succeeds_in_three_attempts() {
        let cleanups = Cell::new(0);
        let result = with_retry(
            &RetryPolicy::immediate(3),
            "pull",
            |attempt| if attempt < 3 { Err(fail("EOF")) } else { Ok("done") },
            || {
                cleanups.set(cleanups.get() + 1);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(result.value, "done");
        assert_eq!(result.attempts, 3);
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn three_failures_run_cleanup_exactly_twice() {
        let cleanups = Cell::new(0);
        let calls = Cell::new(0);
        let err = with_retry(
            &RetryPolicy::immediate(3),
            "pull",
            |_| -> Result<(), CoreError> {
                calls.set(calls.get() + 1);
                Err(fail("EOF"))
            },
            || {
                cleanups.set(cleanups.get() + 1);
                Ok(())
            },
        )
        .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(cleanups.get(), 2);
        match err {
            CoreError::RetriesExhausted { attempts, .. } => assert_eq!(attempts.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resource_exhaustion_grants_one_extra_cycle() {
        let cleanups = Cell::new(0);
        let calls = Cell::new(0);
        let err = with_retry(
            &RetryPolicy::immediate(2),
            "pull",
            |_| -> Result<(), CoreError> {
                calls.set(calls.get() + 1);
                Err(CoreError::ResourceExhausted {
                    path: "/var/lib/docker".to_owned(),
                    available_kb: 10,
                    required_kb: 100,
                })
            },
            || {
                cleanups.set(cleanups.get() + 1);
                Ok(())
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::RetriesExhausted { .. }));
        assert_eq!(calls.get(), 3);
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let calls = Cell::new(0);
        let err = with_retry(
            &RetryPolicy::immediate(5),
            "network",
            |_| -> Result<(), CoreError> {
                calls.set(calls.get() + 1);
                Err(CoreError::Cancelled)
            },
            || Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        let huge = RetryPolicy::new(5, Duration::from_secs(100), 10.0);
        assert_eq!(huge.delay_after(4), MAX_DELAY);
    }

    #[test]
    fn zero_attempts_is_treated_as_one() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }

    #[test]
    fn poll_until_sees_condition_become_true() {
        let calls = Cell::new(0);
        let ready = poll_until(Duration::from_secs(2), Duration::from_millis(1), "ready", || {
            calls.set(calls.get() + 1);
            Ok(calls.get() >= 3)
        })
        .unwrap();
        assert!(ready);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn poll_until_gives_up_after_timeout() {
        let ready = poll_until(
            Duration::from_millis(30),
            Duration::from_millis(5),
            "never",
            || Err(fail("not yet")),
        )
        .unwrap();
        assert!(!ready);
    }
}
