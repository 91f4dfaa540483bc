//! Exponential-backoff retry policy shared by the queue and embedding
//! clients.
//!
//! [`RetryPolicy`] is a plain value (max attempts, base delay,
//! multiplier, cap) so each client's retry behavior is testable without
//! real network calls. [`retry_async`] drives an async operation under a
//! policy, consulting a retryable-error predicate between attempts.

use std::future::Future;
use std::time::Duration;

/// Tunable parameters for exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (single attempt).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Attempt 1 waits `initial_delay`; each later attempt multiplies the
    /// previous delay, clamped to [`max_delay`](Self::max_delay).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..attempt {
            let next_ms = (delay.as_millis() as f64 * self.multiplier) as u64;
            delay = Duration::from_millis(next_ms).min(self.max_delay);
        }
        delay.min(self.max_delay)
    }
}

/// Run `op` under `policy`, retrying while `is_retryable` approves.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once attempts are exhausted.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= policy.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn delay_clamps_at_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn full_backoff_sequence() {
        let policy = RetryPolicy {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        };
        let expected = [1, 2, 4, 8, 10, 10];
        for (i, &secs) in expected.iter().enumerate() {
            assert_eq!(policy.delay_for(i as u32 + 1), Duration::from_secs(secs));
        }
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_makes_exactly_three_calls() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = retry_async(&fast_policy(3), |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("transient")
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_async(&fast_policy(3), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still down") }
        })
        .await;

        assert_eq!(result, Err("still down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_async(&fast_policy(3), |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("bad request") }
        })
        .await;

        assert_eq!(result, Err("bad request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_async(&fast_policy(3), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
