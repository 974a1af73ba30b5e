//! HTTP response classification shared by the platform adapters

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tablesync_domain::{Platform, Result, ServerErrorKind, SyncError};

use super::rate_limit::{parse_retry_after, RateLimitTracker};
use crate::errors::InfraError;
use crate::http::HttpClient;

const SNIPPET_CHARS: usize = 200;

/// Decoded response that passed HTTP-level classification
#[derive(Debug)]
pub(crate) struct JsonReply {
    pub status: StatusCode,
    pub body: Value,
}

impl JsonReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Take one call from the budget, send, and classify the response
pub(crate) async fn execute(
    http: &HttpClient,
    platform: Platform,
    limiter: &RateLimitTracker,
    builder: RequestBuilder,
) -> Result<JsonReply> {
    limiter.acquire().await;
    let response = http.send(platform, builder).await?;
    read_json(platform, response, limiter).await
}

/// Classify the HTTP status, then decode the body
///
/// 401, 403, 404, 429 and 5xx become errors here. Other statuses are returned
/// with their body so the adapter can classify the platform's own error code.
pub(crate) async fn read_json(
    platform: Platform,
    response: Response,
    limiter: &RateLimitTracker,
) -> Result<JsonReply> {
    limiter.observe(response.headers());
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let text = response.text().await.map_err(|err| SyncError::Network {
        platform: platform.to_string(),
        message: format!("failed to read response body: {err}"),
    })?;

    if let Some(error) = classify_status(platform, status, retry_after, &text) {
        if let Some(delay) = retry_after.filter(|_| status == StatusCode::TOO_MANY_REQUESTS) {
            limiter.on_retry_after(delay);
        }
        return Err(error);
    }

    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|err| SyncError::from(InfraError::from(err)))?
    };
    Ok(JsonReply { status, body })
}

/// Error for statuses that are classified before any body code
pub(crate) fn classify_status(
    platform: Platform,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> Option<SyncError> {
    let platform = platform.to_string();
    let message = snippet(status, body);
    let error = match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth { platform, message },
        StatusCode::FORBIDDEN => SyncError::Permission { platform, message },
        StatusCode::NOT_FOUND => SyncError::NotFound { platform, message },
        StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimit {
            platform,
            message,
            retry_after_ms: retry_after.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        },
        status if status.is_server_error() => SyncError::Server {
            platform,
            kind: ServerErrorKind::Status(status.as_u16()),
            message,
        },
        _ => return None,
    };
    Some(error)
}

/// Fallback for a non-success status whose body carried no known code
pub(crate) fn unexpected_status(platform: Platform, reply: &JsonReply) -> SyncError {
    SyncError::Unknown {
        platform: platform.to_string(),
        code: Some(reply.status.as_u16().to_string()),
        message: reply.body.to_string(),
    }
}

fn snippet(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("http {}", status.as_u16());
    }
    let cut: String = body.chars().take(SNIPPET_CHARS).collect();
    format!("http {}: {cut}", status.as_u16())
}

/// Millisecond timestamp that may arrive as a number or a string
pub(crate) fn millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Token lifetime in seconds, defaulting to two hours
pub(crate) fn lifetime(value: &Value) -> Duration {
    Duration::from_secs(value.as_u64().unwrap_or(7200))
}
