//! Circuit breaker with a single half-open trial call
//!
//! Consecutive failures are counted while closed. Reaching the threshold opens
//! the breaker, which then rejects calls until its cool-down has elapsed. The
//! first caller after that runs alone as a half-open trial: success closes the
//! breaker, failure opens it for another full cool-down. A trial whose
//! [`BreakerPermit`] is dropped unreported hands the trial slot to the next
//! caller.
//!
//! State lives behind one synchronous mutex and is never held across an
//! `.await`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};

/// Rejected breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BreakerConfigError {
    #[error("failure threshold must be at least 1")]
    ZeroThreshold,
}

/// Returned by [`CircuitBreaker::try_acquire`] when a call may not proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit breaker is open; next attempt in {retry_after:?}")]
pub struct BreakerRejection {
    /// Time left until a trial call is admitted
    pub retry_after: Duration,
}

/// Failure of a call made through [`CircuitBreaker::execute`]
#[derive(Debug, Error)]
pub enum BreakerError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Open(BreakerRejection),

    #[error(transparent)]
    Failed(E),
}

pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Validated breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: u32,
    cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// # Errors
    /// Returns [`BreakerConfigError::ZeroThreshold`] when `failure_threshold` is 0.
    pub const fn new(
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Result<Self, BreakerConfigError> {
        if failure_threshold == 0 {
            return Err(BreakerConfigError::ZeroThreshold);
        }
        Ok(Self { failure_threshold, cooldown })
    }

    /// Consecutive failures that open the breaker
    pub const fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Time spent open before a trial call
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// Snapshot of one breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    /// Remaining cool-down while open
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    consecutive_failures: u32,
    calls: u64,
    failures: u64,
    rejected: u64,
}

impl Inner {
    const fn closed() -> Self {
        Self { phase: Phase::Closed, consecutive_failures: 0, calls: 0, failures: 0, rejected: 0 }
    }

    const fn state(&self) -> CircuitState {
        match self.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Admit one call; `Ok(true)` marks the half-open trial
    fn admit(&mut self, now: Instant) -> Result<bool, BreakerRejection> {
        let trial = match self.phase {
            Phase::Closed => false,
            Phase::Open { until } if now < until => {
                self.rejected += 1;
                return Err(BreakerRejection { retry_after: until - now });
            }
            Phase::Open { .. } | Phase::HalfOpen { trial_in_flight: false } => {
                self.phase = Phase::HalfOpen { trial_in_flight: true };
                info!("circuit breaker half-open, admitting trial call");
                true
            }
            Phase::HalfOpen { trial_in_flight: true } => {
                self.rejected += 1;
                return Err(BreakerRejection { retry_after: Duration::ZERO });
            }
        };
        self.calls += 1;
        Ok(trial)
    }

    fn release_trial(&mut self) {
        if let Phase::HalfOpen { trial_in_flight: true } = self.phase {
            self.phase = Phase::HalfOpen { trial_in_flight: false };
            debug!("trial call abandoned, next caller becomes the trial");
        }
    }
}

/// Permission for one call, handed out by [`CircuitBreaker::try_acquire`]
///
/// Report the outcome with [`succeed`](Self::succeed) or
/// [`fail`](Self::fail). Dropping the permit unreported (a cancelled or
/// panicked call) records nothing, but frees the half-open trial slot.
#[must_use = "dropping a permit unreported records no outcome"]
pub struct BreakerPermit<'a, C: Clock = SystemClock> {
    breaker: &'a CircuitBreaker<C>,
    trial: bool,
    settled: bool,
}

impl<C: Clock> BreakerPermit<'_, C> {
    /// Whether this call is the half-open trial
    pub const fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl<C: Clock> Drop for BreakerPermit<'_, C> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.inner.lock().release_trial();
        }
    }
}

impl<C: Clock> fmt::Debug for BreakerPermit<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("trial", &self.trial)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

/// Circuit breaker generic over its [`Clock`]
///
/// Clones share state, so every task talking to one platform can hold its own
/// handle to the same breaker.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("phase", &inner.phase)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Self {
        Self { config, inner: Arc::new(Mutex::new(Inner::closed())), clock: Arc::new(clock) }
    }

    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask for permission to make one call
    ///
    /// Once the cool-down has elapsed exactly one caller is admitted as the
    /// half-open trial. Everyone else is rejected until that trial reports
    /// or its permit is dropped.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_, C>, BreakerRejection> {
        let now = self.clock.now();
        let trial = self.inner.lock().admit(now)?;
        Ok(BreakerPermit { breaker: self, trial, settled: false })
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        match inner.phase {
            Phase::HalfOpen { .. } => {
                inner.phase = Phase::Closed;
                info!("circuit breaker closed after successful trial call");
            }
            Phase::Open { .. } => debug!("late success recorded while breaker is open"),
            Phase::Closed => {}
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let cooldown = self.config.cooldown;
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.failures += 1;

        match inner.phase {
            Phase::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.phase = Phase::Open { until: now + cooldown };
                warn!(
                    failures = inner.consecutive_failures,
                    cooldown_ms = millis(cooldown),
                    "circuit breaker opened"
                );
            }
            Phase::HalfOpen { .. } => {
                inner.phase = Phase::Open { until: now + cooldown };
                warn!(cooldown_ms = millis(cooldown), "trial call failed, breaker re-opened");
            }
            Phase::Closed | Phase::Open { .. } => {}
        }
    }

    /// Run `operation` if the breaker admits it and record the outcome
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let permit = self.try_acquire().map_err(|rejection| {
            debug!(retry_after_ms = millis(rejection.retry_after), "circuit breaker rejected call");
            BreakerError::Open(rejection)
        })?;

        let result = operation().await;
        match &result {
            Ok(_) => permit.succeed(),
            Err(_) => permit.fail(),
        }
        result.map_err(BreakerError::Failed)
    }

    /// Current state; an expired cool-down is only noticed by `try_acquire`
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state()
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let retry_after = match inner.phase {
            Phase::Open { until } => Some(until.saturating_duration_since(now)),
            _ => None,
        };

        CircuitBreakerMetrics {
            state: inner.state(),
            consecutive_failures: inner.consecutive_failures,
            total_calls: inner.calls,
            total_failures: inner.failures,
            rejected_calls: inner.rejected,
            retry_after,
        }
    }

    /// Force the breaker closed and clear its counters
    pub fn reset(&self) {
        *self.inner.lock() = Inner::closed();
        info!("circuit breaker reset");
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
