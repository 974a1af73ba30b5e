//! Remaining-call budget with a reset instant
//!
//! Mirrors the bookkeeping REST platforms expose through rate-limit headers:
//! a number of calls left in the current window and the moment the window
//! resets. When the server reports nothing, the budget falls back to a local
//! cap of `limit` calls per `window`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{Clock, SystemClock};

#[derive(Debug)]
struct BudgetState {
    remaining: u32,
    reset_at: Instant,
}

/// Rate-limit budget generic over its [`Clock`]
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use tablesync_common::resilience::RateBudget;
///
/// let budget = RateBudget::new(2, Duration::from_secs(1));
/// assert!(budget.reserve().is_none());
/// assert!(budget.reserve().is_none());
/// assert!(budget.reserve().is_some(), "third call must wait for the reset");
/// ```
pub struct RateBudget<C: Clock = SystemClock> {
    limit: u32,
    window: Duration,
    state: Mutex<BudgetState>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for RateBudget<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RateBudget")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("remaining", &state.remaining)
            .finish_non_exhaustive()
    }
}

impl RateBudget<SystemClock> {
    /// Budget of `limit` calls per `window` on the system clock
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_clock(limit, window, SystemClock)
    }
}

impl<C: Clock> RateBudget<C> {
    /// Budget with a custom clock
    pub fn with_clock(limit: u32, window: Duration, clock: C) -> Self {
        let now = clock.now();
        Self {
            limit: limit.max(1),
            window,
            state: Mutex::new(BudgetState { remaining: limit.max(1), reset_at: now + window }),
            clock: Arc::new(clock),
        }
    }

    /// Take one call from the budget
    ///
    /// Returns `None` when the call may proceed, or the time left until the
    /// window resets when the budget is exhausted.
    pub fn reserve(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if now >= state.reset_at {
            state.remaining = self.limit;
            state.reset_at = now + self.window;
        }

        if state.remaining == 0 {
            let wait = state.reset_at - now;
            let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
            debug!(wait_ms, "rate budget exhausted");
            return Some(wait);
        }

        state.remaining -= 1;
        None
    }

    /// Replace the local estimate with what the server reported
    pub fn observe(&self, remaining: u32, reset_in: Duration) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.remaining = remaining;
        state.reset_at = now + reset_in;
    }

    /// Mark the budget exhausted for `duration` (e.g. after HTTP 429)
    pub fn exhaust_for(&self, duration: Duration) {
        self.observe(0, duration);
    }

    /// Calls left in the current window
    pub fn remaining(&self) -> u32 {
        let now = self.clock.now();
        let state = self.state.lock();
        if now >= state.reset_at {
            self.limit
        } else {
            state.remaining
        }
    }

    /// Time until the current window resets
    pub fn reset_in(&self) -> Duration {
        let now = self.clock.now();
        self.state.lock().reset_at.saturating_duration_since(now)
    }

    /// Configured local cap per window
    pub const fn limit(&self) -> u32 {
        self.limit
    }
}
