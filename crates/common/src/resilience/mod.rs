//! Resilience patterns for talking to flaky remote platforms
//!
//! - **Circuit Breaker**: stops calling a platform after repeated failures
//!   and lets a single trial call through once the cool-down elapses
//! - **Retry**: bounded retries with exponential backoff, driven by a
//!   caller-supplied classification policy
//! - **Rate Budget**: remaining-call / reset-time bookkeeping fed by response
//!   headers or a local cap
//!
//! All three read time through [`Clock`], so tests drive them with
//! [`MockClock`] instead of sleeping.

pub mod circuit_breaker;
pub mod clock;
pub mod rate_budget;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    BreakerConfigError, BreakerError, BreakerPermit, BreakerRejection, BreakerResult,
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use rate_budget::RateBudget;
// Re-export retry types
pub use retry::{
    Backoff, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryOutcome, RetryPolicy,
    RetryResult,
};
