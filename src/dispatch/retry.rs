//! Bounded retry with fixed or exponential backoff

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::DispatchConfig;
use crate::transport::TransportError;

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor per retry (1.0 = fixed delay)
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10_000,
            max_delay_ms: 60_000,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Backoff calculator with jitter
pub struct Backoff {
    config: BackoffConfig,
    current_delay_ms: f64,
    attempt: u32,
}

impl Backoff {
    pub fn with_config(config: BackoffConfig) -> Self {
        let initial = config.initial_delay_ms as f64;
        Self {
            config,
            current_delay_ms: initial,
            attempt: 0,
        }
    }

    /// Get the next delay duration
    pub fn next_delay(&mut self) -> Duration {
        let base_delay = if self.attempt == 0 {
            self.current_delay_ms
        } else {
            self.current_delay_ms * self.config.multiplier
        };
        self.attempt += 1;

        let capped_delay = base_delay.min(self.config.max_delay_ms as f64).max(0.0);
        self.current_delay_ms = capped_delay;

        let jitter_range = capped_delay * self.config.jitter_factor;
        let final_delay = if jitter_range > 0.0 {
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Errors that know whether trying again can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded on attempt `attempts`.
    Succeeded { value: T, attempts: u32 },
    /// Every allowed attempt failed; `error` is the last failure.
    Exhausted { error: E, attempts: u32 },
    /// A non-retryable error stopped the loop early.
    Aborted { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Attempt an operation, backing off after each retryable failure, up to
/// `max_attempts` attempts in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: BackoffConfig::default(),
        }
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: BackoffConfig {
                initial_delay_ms: config.retry_delay_ms,
                max_delay_ms: config.max_retry_delay_ms.max(config.retry_delay_ms),
                multiplier: config.backoff_multiplier.max(1.0),
                jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
            },
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffConfig {
                initial_delay_ms: 0,
                max_delay_ms: 0,
                multiplier: 1.0,
                jitter_factor: 0.0,
            },
        }
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of
    /// attempts. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = Backoff::with_config(self.backoff.clone());
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return RetryOutcome::Aborted {
                    error,
                    attempts: attempt,
                };
            }

            if attempt >= max_attempts {
                return RetryOutcome::Exhausted {
                    error,
                    attempts: attempt,
                };
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fixed_backoff() {
        let mut backoff = Backoff::with_config(BackoffConfig {
            initial_delay_ms: 10_000,
            max_delay_ms: 60_000,
            multiplier: 1.0,
            jitter_factor: 0.0,
        });

        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        }
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn test_exponential_backoff_increases_and_caps() {
        let mut backoff = Backoff::with_config(BackoffConfig {
            initial_delay_ms: 100,
            max_delay_ms: 500,
            multiplier: 2.0,
            jitter_factor: 0.0,
        });

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut backoff = Backoff::with_config(BackoffConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
            multiplier: 1.0,
            jitter_factor: 0.5,
        });

        for _ in 0..50 {
            let delay = backoff.next_delay().as_millis();
            assert!((500..=1500).contains(&delay), "delay {delay} out of range");
        }
    }

    type Attempt = std::future::Ready<Result<(), TransportError>>;

    fn always(err: fn() -> TransportError) -> (Arc<AtomicU32>, impl FnMut(u32) -> Attempt) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = move |_: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(err()))
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff: BackoffConfig::default(),
        };
        let (calls, op) = always(|| TransportError::Smtp("down".into()));

        let started = tokio::time::Instant::now();
        let outcome = policy.run(op).await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 10, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        // nine 10s waits between ten attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(90));
        assert!(elapsed < Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome = policy
            .run(|attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TransportError::Smtp("busy".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert!(matches!(
            outcome,
            RetryOutcome::Succeeded {
                value: 3,
                attempts: 3
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_aborts() {
        let policy = RetryPolicy::immediate(10);
        let (calls, op) = always(|| TransportError::InvalidAddress("x".into()));

        let outcome = policy.run(op).await;
        assert!(matches!(outcome, RetryOutcome::Aborted { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let config = DispatchConfig {
            max_attempts: 3,
            retry_delay_ms: 250,
            ..DispatchConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff.initial_delay_ms, 250);
        assert_eq!(policy.backoff.multiplier, 1.0);
    }
}
