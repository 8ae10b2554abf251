//! Bounded retries for embedder calls.
//!
//! Only transient [`EmbedError`]s are retried. The delay before attempt
//! `n + 1` is `initial_backoff * 2^n`, capped at `max_backoff`, plus up to
//! 25% random jitter. Cancellation interrupts both a pending call and a
//! pending sleep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::EmbedError;

/// Failure after the policy gave up.
#[derive(Debug)]
pub struct RetryError {
    /// Attempts actually made, including the first
    pub attempts: u32,
    pub source: EmbedError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// Retries immediately, without sleeping between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th failure (0-based), jitter included.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as u64;
        let max_ms = self.max_backoff.as_millis() as u64;

        // Shift capped at 2^6 to prevent overflow
        let capped_ms = base_ms.saturating_mul(1 << attempt.min(6)).min(max_ms);
        let max_jitter_ms = capped_ms / 4;
        let jitter_ms = if max_jitter_ms > 0 {
            rand::rng().random_range(0..=max_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(capped_ms + jitter_ms)
    }

    /// Runs `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires.
    ///
    /// Returns the value together with the number of attempts it took.
    /// `label` only appears in log lines.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<(T, u32), RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EmbedError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(EmbedError::Cancelled),
                result = operation() => result,
            };

            let error = match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= self.max_attempts {
                return Err(RetryError {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.backoff(attempt - 1);
            warn!(
                "{label}: attempt {attempt}/{} failed ({error}); retrying in {}ms",
                self.max_attempts,
                delay.as_millis()
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError {
                        attempts: attempt,
                        source: EmbedError::Cancelled,
                    });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(1_000));
        for attempt in 0..20 {
            let delay = policy.backoff(attempt);
            assert!(delay <= Duration::from_millis(1_250), "{delay:?}");
        }
        assert!(policy.backoff(0) >= Duration::from_millis(100));
        assert!(policy.backoff(0) <= Duration::from_millis(125));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run("test", &CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EmbedError::Transport("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), (7, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(3)
            .run("test", &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(EmbedError::Timeout { timeout_ms: 5 })
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err.source, EmbedError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(5)
            .run("test", &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(EmbedError::Status {
                    status: 400,
                    body: "bad request".into(),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = RetryPolicy::immediate(3)
            .run("test", &cancel, || async { Ok::<_, EmbedError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err.source, EmbedError::Cancelled));
    }
}
