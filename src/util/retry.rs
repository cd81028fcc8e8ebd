//! Retry, reconnect backoff, and bounded polling policies.

use std::future::Future;
use std::time::Duration;

use crate::error::RelayError;

/// Retry policy for idempotent backend requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Execute an async operation with retry.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, RelayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut last_error = None;

        for attempt in 0..self.max_attempts.max(1) {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() || attempt + 1 >= self.max_attempts {
                        return Err(e);
                    }

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Retrying after error"
                    );

                    // Jitter: 75%–125% of backoff
                    let jitter_factor = 0.75 + (rand_factor() * 0.5);
                    tokio::time::sleep(Duration::from_secs_f64(
                        backoff.as_secs_f64() * jitter_factor,
                    ))
                    .await;

                    backoff = Duration::from_secs_f64(
                        (backoff.as_secs_f64() * self.multiplier)
                            .min(self.max_backoff.as_secs_f64()),
                    );

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RelayError::Timeout(0)))
    }
}

/// Reconnect backoff configuration for long-lived stream listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl BackoffPolicy {
    /// Start a fresh backoff sequence at the initial delay.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial,
        }
    }
}

/// Running backoff state.
///
/// The delay only grows; there is no reset after a successful reconnect.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the current delay and advance to `min(current * multiplier, max)`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = delay
            .saturating_mul(self.policy.multiplier.max(1))
            .min(self.policy.max);
        delay
    }
}

/// Bounded polling for results that lag behind a completion signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 12,
            delay: Duration::from_millis(250),
        }
    }
}

impl PollPolicy {
    /// Poll `probe` until it yields `Some`, sleeping `delay` after each miss.
    ///
    /// Errors abort polling immediately. Returns `Ok(None)` once all attempts
    /// are used up.
    pub async fn poll<F, Fut, T>(&self, mut probe: F) -> Result<Option<T>, RelayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, RelayError>>,
    {
        for attempt in 1..=self.attempts {
            if let Some(value) = probe(attempt).await? {
                return Ok(Some(value));
            }
            tracing::trace!(attempt, max_attempts = self.attempts, "poll miss");
            tokio::time::sleep(self.delay).await;
        }
        Ok(None)
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_without_reset() {
        let mut backoff = BackoffPolicy::default().start();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(backoff.current(), Duration::from_secs(30));
    }

    #[test]
    fn backoff_respects_custom_initial() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
            multiplier: 2,
        };
        let mut backoff = policy.start();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_stops_on_first_hit() {
        let policy = PollPolicy::default();
        let mut calls = 0;
        let found = policy
            .poll(|attempt| {
                calls += 1;
                async move { Ok::<_, RelayError>((attempt == 3).then_some("hit")) }
            })
            .await
            .expect("poll should succeed");
        assert_eq!(found, Some("hit"));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_gives_up_after_max_attempts() {
        let policy = PollPolicy {
            attempts: 4,
            delay: Duration::from_millis(10),
        };
        let mut calls = 0;
        let found: Option<()> = policy
            .poll(|_| {
                calls += 1;
                async { Ok(None) }
            })
            .await
            .expect("poll should succeed");
        assert!(found.is_none());
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_propagates_probe_errors() {
        let err = PollPolicy::default()
            .poll(|_| async { Err::<Option<()>, _>(RelayError::Stream("boom".into())) })
            .await
            .expect_err("probe error should abort polling");
        assert!(matches!(err, RelayError::Stream(message) if message == "boom"));
    }
}
