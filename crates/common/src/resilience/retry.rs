//! Bounded retries with doubling backoff
//!
//! A [`RetryExecutor`] runs an async operation at most `max_retries + 1`
//! times. After each failure the [`RetryPolicy`] decides: `Stop` surfaces the
//! error at once, `Retry` waits `initial * 2^attempt` (capped), and
//! `RetryAfter` waits exactly the duration the policy names.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Final failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempt(s): {source}")]
    Exhausted { attempts: u32, source: E },

    #[error("stopped after {attempts} attempt(s): {source}")]
    NonRetryable { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => *attempts,
        }
    }

    /// The error returned by the last attempt
    pub fn into_source(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
        }
    }
}

pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Result plus the bookkeeping of every attempt
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    /// Delays slept between attempts, in order
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait the backoff delay, then try again
    Retry,
    /// Wait exactly this long, then try again
    RetryAfter(Duration),
    Stop,
}

/// Classifies the error raised by the zero-based `attempt`
pub trait RetryPolicy<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

impl<E, F> RetryPolicy<E> for F
where
    F: Fn(&E, u32) -> RetryDecision,
{
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
        self(error, attempt)
    }
}

/// Doubling backoff capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay after the zero-based `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Retry budget and backoff for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::doubling(3, Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryConfig {
    pub const fn doubling(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self { max_retries, backoff: Backoff::new(initial, max) }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Runs operations under one [`RetryConfig`] and [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub const fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.result
    }

    /// Like [`RetryExecutor::execute`], also reporting attempts and delays
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut delays = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            let attempts = attempt + 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempts, "operation succeeded after retries");
                    }
                    return RetryOutcome { result: Ok(value), attempts, delays };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempts, error = %error, "error is not retryable");
                    let result = Err(RetryError::NonRetryable { attempts, source: error });
                    return RetryOutcome { result, attempts, delays };
                }
                _ if attempts >= max_attempts => {
                    warn!(attempts, error = %error, "retries exhausted");
                    let result = Err(RetryError::Exhausted { attempts, source: error });
                    return RetryOutcome { result, attempts, delays };
                }
                RetryDecision::Retry => self.config.backoff.delay(attempt),
                RetryDecision::RetryAfter(delay) => delay,
            };

            warn!(
                attempt = attempts,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
            delays.push(delay);
            attempt += 1;
        }
    }
}
