//! Adapter factory backed by the shared HTTP client

use std::sync::Arc;

use tablesync_core::{AdapterFactory, TableAdapter};
use tablesync_domain::config::HttpConfig;
use tablesync_domain::{Platform, PlatformConfig, Result};
use tracing::debug;

use crate::adapters::{DingtalkAdapter, FeishuAdapter, WecomAdapter};
use crate::http::HttpClient;

/// Builds HTTP adapters that share one connection pool
#[derive(Debug, Clone)]
pub struct HttpAdapterFactory {
    http: HttpClient,
}

impl HttpAdapterFactory {
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self { http: HttpClient::from_config(config)? })
    }

    pub const fn with_client(http: HttpClient) -> Self {
        Self { http }
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn create(&self, platform: Platform, config: &PlatformConfig) -> Result<Arc<dyn TableAdapter>> {
        debug!(%platform, config_id = %config.id, "building adapter");
        let adapter: Arc<dyn TableAdapter> = match platform {
            Platform::Feishu => Arc::new(FeishuAdapter::new(self.http.clone(), config)?),
            Platform::Dingtalk => Arc::new(DingtalkAdapter::new(self.http.clone(), config)?),
            Platform::Wecom => Arc::new(WecomAdapter::new(self.http.clone(), config)?),
        };
        Ok(adapter)
    }
}
