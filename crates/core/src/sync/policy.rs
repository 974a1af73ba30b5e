//! Retry classification for sync errors

use std::time::Duration;

use tablesync_common::{RetryDecision, RetryPolicy};
use tablesync_domain::constants::MAX_RETRY_DELAY_MS;
use tablesync_domain::SyncError;

/// Retries exactly the errors classified as retryable
///
/// A rate-limit error that names its own wait overrides the backoff delay.
/// That wait is capped like the backoff itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifiedRetryPolicy;

impl RetryPolicy<SyncError> for ClassifiedRetryPolicy {
    fn should_retry(&self, error: &SyncError, _attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Stop;
        }
        match error {
            SyncError::RateLimit { retry_after_ms: Some(ms), .. } => {
                let wait = (*ms).min(MAX_RETRY_DELAY_MS);
                RetryDecision::RetryAfter(Duration::from_millis(wait))
            }
            _ => RetryDecision::Retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use tablesync_domain::ServerErrorKind;

    use super::*;

    #[test]
    fn test_rate_limit_uses_advertised_wait() {
        let error = SyncError::RateLimit {
            platform: "feishu".into(),
            message: "too many".into(),
            retry_after_ms: Some(2_500),
        };
        assert_eq!(
            ClassifiedRetryPolicy.should_retry(&error, 0),
            RetryDecision::RetryAfter(Duration::from_millis(2_500))
        );
    }

    #[test]
    fn test_advertised_wait_is_capped() {
        let error = SyncError::RateLimit {
            platform: "wecom".into(),
            message: "quota exhausted".into(),
            retry_after_ms: Some(3_600_000),
        };
        assert_eq!(
            ClassifiedRetryPolicy.should_retry(&error, 0),
            RetryDecision::RetryAfter(Duration::from_millis(MAX_RETRY_DELAY_MS))
        );
    }

    #[test]
    fn test_transient_errors_use_backoff() {
        let error = SyncError::Server {
            platform: "wecom".into(),
            kind: ServerErrorKind::Unavailable,
            message: "busy".into(),
        };
        assert_eq!(ClassifiedRetryPolicy.should_retry(&error, 2), RetryDecision::Retry);
    }

    #[test]
    fn test_fatal_errors_stop() {
        for error in [
            SyncError::Permission { platform: "dingtalk".into(), message: "scope".into() },
            SyncError::Auth { platform: "dingtalk".into(), message: "expired".into() },
            SyncError::CircuitOpen { platform: "dingtalk".into(), retry_after_ms: 100 },
        ] {
            assert_eq!(ClassifiedRetryPolicy.should_retry(&error, 0), RetryDecision::Stop);
        }
    }
}
