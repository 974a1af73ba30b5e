use std::time::Duration;

use reqwest::{IntoUrl, Method, RequestBuilder, Response};
use tablesync_domain::config::HttpConfig;
use tablesync_domain::{Platform, Result, SyncError};
use tracing::debug;

use crate::errors::InfraError;

/// Pooled HTTP client shared by every platform adapter.
///
/// `send` performs exactly one request. Retrying is the sync engine's job, so
/// this type only times requests out and labels transport failures with the
/// platform that made them.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Client with [`HttpConfig::default`] settings.
    pub fn new() -> Result<Self> {
        Self::from_config(&HttpConfig::default())
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Self::with_timeout(Duration::from_millis(config.timeout_ms), &config.user_agent)
    }

    /// # Errors
    /// Fails when the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration, user_agent: &str) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .no_proxy()
            .build()
            .map_err(|err| SyncError::from(InfraError::from(err)))?;
        Ok(Self { inner, timeout })
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.inner.request(method, url)
    }

    /// Send one request on behalf of `platform`.
    ///
    /// Every HTTP status comes back as a response. Only transport failures
    /// become errors.
    pub async fn send(&self, platform: Platform, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(|err| SyncError::from(InfraError::from(err)))?;
        let method = request.method().clone();
        let path = request.url().path().to_string();
        debug!(%platform, %method, %path, "http request");

        let response = self.inner.execute(request).await.map_err(|err| {
            debug!(%platform, %method, %path, error = %err, "http transport failure");
            self.transport_error(platform, &err)
        })?;
        debug!(%platform, %method, %path, status = %response.status(), "http response");
        Ok(response)
    }

    fn transport_error(&self, platform: Platform, err: &reqwest::Error) -> SyncError {
        let platform = platform.to_string();
        if err.is_timeout() {
            let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
            return SyncError::Timeout { platform, timeout_ms };
        }
        let message =
            if err.is_connect() { format!("connection failed: {err}") } else { err.to_string() };
        SyncError::Network { platform, message }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use tablesync_domain::ErrorKind;
    use tokio::net::TcpListener;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn get(client: &HttpClient, platform: Platform, url: String) -> Result<Response> {
        client.send(platform, client.request(Method::GET, url)).await
    }

    #[tokio::test]
    async fn error_status_is_not_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let response =
            get(&client, Platform::Feishu, format!("{}/flaky", server.uri())).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn config_sets_user_agent_and_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", "tablesync-test"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = HttpConfig { timeout_ms: 5_000, user_agent: "tablesync-test".into() };
        let client = HttpClient::from_config(&config).unwrap();
        let response = get(&client, Platform::Wecom, format!("{}/ua", server.uri())).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(client.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpClient::with_timeout(Duration::from_millis(50), "test").unwrap();
        let error =
            get(&client, Platform::Dingtalk, format!("{}/slow", server.uri())).await.unwrap_err();

        assert_eq!(error, SyncError::Timeout { platform: "dingtalk".into(), timeout_ms: 50 });
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::with_timeout(Duration::from_secs(2), "test").unwrap();
        let error = get(&client, Platform::Feishu, format!("http://{addr}/")).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Network);
        assert_eq!(error.platform(), Some("feishu"));
    }
}
