//! Bounded-attempt execution with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Succeeded(T),
    /// Failed; try again if attempts remain.
    Failed(E),
    /// Failed in a way retrying cannot fix.
    Aborted(E),
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryFailure<E> {
    /// Every attempt failed; carries the last failure.
    Exhausted(E),
    /// An attempt aborted the sequence.
    Aborted(E),
    /// The caller cancelled during backoff; carries the last failure.
    Interrupted(E),
}

impl<E> RetryFailure<E> {
    pub fn error(&self) -> &E {
        match self {
            Self::Exhausted(e) | Self::Aborted(e) | Self::Interrupted(e) => e,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            Self::Exhausted(e) | Self::Aborted(e) | Self::Interrupted(e) => e,
        }
    }
}

/// Result of a retried operation plus the number of attempts made.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, RetryFailure<E>>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A policy making exactly one attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds, aborts, or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number. Backoff sleeps end
    /// early when `cancel` fires.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let max = self.attempts();
        let mut attempt = 1;
        loop {
            let error = match operation(attempt).await {
                Attempt::Succeeded(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Attempt::Aborted(error) => {
                    return RetryOutcome {
                        result: Err(RetryFailure::Aborted(error)),
                        attempts: attempt,
                    };
                }
                Attempt::Failed(error) => error,
            };

            if attempt >= max {
                return RetryOutcome {
                    result: Err(RetryFailure::Exhausted(error)),
                    attempts: attempt,
                };
            }

            let delay = self.delay_after(attempt);
            warn!(
                "Attempt {}/{} failed: {}, retrying in {:?}",
                attempt, max, error, delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return RetryOutcome {
                        result: Err(RetryFailure::Interrupted(error)),
                        attempts: attempt,
                    };
                }
                _ = sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
