//! Shared building blocks for the TableSync crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: serde helpers
//! - `runtime`: resilience primitives (circuit breaker, retry, rate budget)
//! - `observability`: tracing for the runtime tier (implied by `runtime`)
//! - `test-utils`: seeded fixtures for property-style tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", all(test, feature = "runtime")))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use resilience::{
    Backoff, BreakerConfigError, BreakerError, BreakerPermit, BreakerRejection, BreakerResult,
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, Clock, MockClock,
    RateBudget, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryOutcome, RetryPolicy,
    RetryResult, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
