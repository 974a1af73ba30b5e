//! Per-platform circuit breakers shared by every job of one engine

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tablesync_common::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, Clock, SystemClock,
};
use tablesync_domain::{BreakerConfig, Platform, Result, SyncError};
use tokio::time::Instant;

/// Type-erased clock so engines need no clock parameter
#[derive(Clone)]
pub struct SharedClock(Arc<dyn Clock>);

impl SharedClock {
    pub fn new(clock: impl Clock) -> Self {
        Self(Arc::new(clock))
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl std::fmt::Debug for SharedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedClock")
    }
}

impl Clock for SharedClock {
    fn now(&self) -> Instant {
        self.0.now()
    }
}

/// Lazily created breaker per platform
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    clock: SharedClock,
    breakers: DashMap<Platform, CircuitBreaker<SharedClock>>,
}

impl BreakerRegistry {
    /// # Errors
    /// Returns `SyncError::InvalidInput` when the breaker settings are invalid.
    pub fn new(settings: &BreakerConfig, clock: SharedClock) -> Result<Self> {
        let config = CircuitBreakerConfig::new(
            settings.failure_threshold,
            Duration::from_millis(settings.cooldown_ms),
        )
        .map_err(|e| SyncError::InvalidInput(format!("invalid breaker settings: {e}")))?;
        Ok(Self { config, clock, breakers: DashMap::new() })
    }

    /// Breaker for `platform`; clones share state
    pub fn get(&self, platform: Platform) -> CircuitBreaker<SharedClock> {
        self.breakers
            .entry(platform)
            .or_insert_with(|| CircuitBreaker::with_clock(self.config, self.clock.clone()))
            .clone()
    }

    /// State of a platform's breaker, closed if never used
    pub fn state(&self, platform: Platform) -> CircuitState {
        self.breakers.get(&platform).map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    pub fn metrics(&self, platform: Platform) -> Option<CircuitBreakerMetrics> {
        self.breakers.get(&platform).map(|breaker| breaker.metrics())
    }

    /// Close a platform's breaker manually
    pub fn reset(&self, platform: Platform) {
        if let Some(breaker) = self.breakers.get(&platform) {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use tablesync_common::MockClock;

    use super::*;

    fn registry(clock: &MockClock) -> BreakerRegistry {
        BreakerRegistry::new(
            &BreakerConfig { failure_threshold: 2, cooldown_ms: 1_000 },
            SharedClock::new(clock.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_breakers_are_per_platform_and_shared() {
        let clock = MockClock::new();
        let registry = registry(&clock);

        let first = registry.get(Platform::Feishu);
        let second = registry.get(Platform::Feishu);
        first.record_failure();
        second.record_failure();

        assert_eq!(registry.state(Platform::Feishu), CircuitState::Open);
        assert_eq!(registry.state(Platform::Wecom), CircuitState::Closed);
    }

    #[test]
    fn test_cooldown_follows_injected_clock() {
        let clock = MockClock::new();
        let registry = registry(&clock);
        let breaker = registry.get(Platform::Dingtalk);
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.try_acquire().is_err());

        clock.advance_millis(1_000);
        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(registry.state(Platform::Dingtalk), CircuitState::HalfOpen);
        trial.succeed();
        assert_eq!(registry.state(Platform::Dingtalk), CircuitState::Closed);
    }

    #[test]
    fn test_reset_closes_breaker() {
        let clock = MockClock::new();
        let registry = registry(&clock);
        let breaker = registry.get(Platform::Wecom);
        breaker.record_failure();
        breaker.record_failure();

        registry.reset(Platform::Wecom);
        assert_eq!(registry.state(Platform::Wecom), CircuitState::Closed);
        assert_eq!(registry.metrics(Platform::Wecom).map(|m| m.consecutive_failures), Some(0));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let result = BreakerRegistry::new(
            &BreakerConfig { failure_threshold: 0, cooldown_ms: 1_000 },
            SharedClock::default(),
        );
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    }
}
