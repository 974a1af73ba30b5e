//! Rate-limit bookkeeping fed by response headers

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tablesync_common::resilience::RateBudget;
use tablesync_domain::Platform;
use tracing::debug;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Reset values above this are epoch seconds, below it delta seconds
const EPOCH_CUTOFF: u64 = 1_000_000_000;

/// Per-adapter call budget
///
/// Starts from the platform's observed requests-per-second cap and is
/// corrected by `x-ratelimit-*` headers whenever a response carries them.
#[derive(Debug)]
pub struct RateLimitTracker {
    platform: Platform,
    budget: RateBudget,
}

impl RateLimitTracker {
    pub fn new(platform: Platform) -> Self {
        Self::with_limit(platform, platform.capabilities().requests_per_second)
    }

    /// Tracker with a custom local cap per second
    pub fn with_limit(platform: Platform, requests_per_second: u32) -> Self {
        Self { platform, budget: RateBudget::new(requests_per_second, Duration::from_secs(1)) }
    }

    /// Wait until the budget allows one more call, then take it
    pub async fn acquire(&self) {
        while let Some(wait) = self.budget.reserve() {
            debug!(
                platform = %self.platform,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "rate budget exhausted, waiting for reset"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Apply `x-ratelimit-remaining` / `x-ratelimit-reset` when both are present
    pub fn observe(&self, headers: &HeaderMap) {
        let Some(remaining) = header_u64(headers, REMAINING_HEADER) else {
            return;
        };
        let Some(reset) = header_u64(headers, RESET_HEADER) else {
            return;
        };
        let reset_in = reset_delay(reset, Utc::now());
        self.budget.observe(u32::try_from(remaining).unwrap_or(u32::MAX), reset_in);
    }

    /// Zero the budget until the advertised retry time
    pub fn on_retry_after(&self, delay: Duration) {
        self.budget.exhaust_for(delay);
    }

    pub fn remaining(&self) -> u32 {
        self.budget.remaining()
    }
}

/// Delay advertised by a `Retry-After` header
///
/// Accepts delta seconds or an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn reset_delay(reset: u64, now: DateTime<Utc>) -> Duration {
    if reset > EPOCH_CUTOFF {
        let now = u64::try_from(now.timestamp()).unwrap_or_default();
        Duration::from_secs(reset.saturating_sub(now))
    } else {
        Duration::from_secs(reset)
    }
}
