//! Feishu Bitable adapter

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tablesync_core::mapping::FieldCodec;
use tablesync_core::{ItemOutcome, TableAdapter};
use tablesync_domain::constants::{FEISHU_BATCH_CAP, FEISHU_BATCH_DELAY_MS};
use tablesync_domain::{
    require_fields, Credentials, DeleteResult, FieldInfo, Platform, PlatformConfig,
    PlatformEnvelope, RecordPage, RecordQuery, RemoteRecord, Result, ServerErrorKind, SyncError,
    TableInfo,
};
use tracing::{debug, instrument};

use super::batch::chunked;
use super::rate_limit::RateLimitTracker;
use super::response::{execute, lifetime, millis, unexpected_status, JsonReply};
use super::token::{fingerprint, MintedToken, TokenCache};
use crate::http::HttpClient;

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";

const PLATFORM: Platform = Platform::Feishu;
const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

/// Adapter for Feishu Bitable tables
///
/// Uses the tenant access token of an internal app. Batch writes go through
/// the native `batch_create` / `batch_update` endpoints, at most
/// [`FEISHU_BATCH_CAP`] rows per call.
#[derive(Debug)]
pub struct FeishuAdapter {
    http: HttpClient,
    base_url: String,
    credentials: Credentials,
    app_token: String,
    table_id: String,
    codec: FieldCodec,
    tokens: TokenCache,
    limiter: RateLimitTracker,
    batch_delay: Duration,
}

impl FeishuAdapter {
    /// Build an adapter for one connection profile
    ///
    /// # Errors
    /// Returns `SyncError::Configuration` naming every blank required field.
    pub fn new(http: HttpClient, config: &PlatformConfig) -> Result<Self> {
        require_fields(
            PLATFORM,
            &[
                ("app_id", config.credentials.app_id.as_str()),
                ("app_secret", config.credentials.app_secret.as_str()),
                ("app_token", config.destination.workspace_id.as_str()),
                ("table_id", config.destination.table_id.as_str()),
            ],
        )?;

        Ok(Self {
            http,
            base_url: base_url(config),
            credentials: config.credentials.clone(),
            app_token: config.destination.workspace_id.clone(),
            table_id: config.destination.table_id.clone(),
            codec: FieldCodec::for_platform(PLATFORM),
            tokens: TokenCache::new(),
            limiter: RateLimitTracker::new(PLATFORM),
            batch_delay: Duration::from_millis(FEISHU_BATCH_DELAY_MS),
        })
    }

    /// Override the pause between native batch calls
    #[must_use]
    pub const fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    async fn token(&self) -> Result<String> {
        self.tokens.get_or_refresh(&fingerprint(&self.credentials), || self.mint()).await
    }

    async fn mint(&self) -> Result<MintedToken> {
        let url = format!("{}{TOKEN_PATH}", self.base_url);
        let builder = self.http.request(Method::POST, url).json(&json!({
            "app_id": self.credentials.app_id,
            "app_secret": self.credentials.app_secret,
        }));
        let reply = execute(&self.http, PLATFORM, &self.limiter, builder).await?;
        let body = check(reply)?;

        let token = body
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::Auth {
                platform: PLATFORM.to_string(),
                message: "token response carried no tenant_access_token".into(),
            })?;
        Ok(MintedToken { token: token.to_string(), expires_in: lifetime(&body["expire"]) })
    }

    fn table_url(&self, suffix: &str) -> String {
        format!(
            "{}/open-apis/bitable/v1/apps/{}/tables/{}{suffix}",
            self.base_url, self.app_token, self.table_id
        )
    }

    /// Authenticated call returning the envelope's `data`
    async fn call(
        &self,
        method: Method,
        url: String,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value> {
        let token = self.token().await?;
        let mut builder = self.http.request(method, url).bearer_auth(token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let result = execute(&self.http, PLATFORM, &self.limiter, builder).await.and_then(check);
        match result {
            Ok(mut body) => Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null)),
            Err(error) => {
                if matches!(error, SyncError::Auth { .. }) {
                    self.tokens.invalidate().await;
                }
                Err(error)
            }
        }
    }

    fn cells(&self, envelope: &PlatformEnvelope) -> Map<String, Value> {
        self.codec.encode(&envelope.logical_fields())
    }

    fn parse_record(&self, value: &Value) -> Result<RemoteRecord> {
        let id = value
            .get("record_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Deserialization("feishu record without record_id".into()))?;
        let fields = value.get("fields").and_then(Value::as_object).cloned().unwrap_or_default();

        Ok(RemoteRecord::new(id, self.codec.decode(&fields)).with_times_millis(
            value.get("created_time").and_then(millis),
            value.get("last_modified_time").and_then(millis),
        ))
    }

    fn parse_records(&self, data: &Value, expected: usize) -> Vec<ItemOutcome<RemoteRecord>> {
        let records = data.get("records").and_then(Value::as_array).cloned().unwrap_or_default();
        if records.len() != expected {
            debug!(expected, returned = records.len(), "feishu batch answered short");
        }
        records.iter().map(|record| self.parse_record(record)).collect()
    }

    async fn create_chunk(
        &self,
        chunk: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        let records: Vec<Value> =
            chunk.iter().map(|envelope| json!({ "fields": self.cells(envelope) })).collect();
        let url = self.table_url("/records/batch_create");
        let data = self.call(Method::POST, url, &[], Some(json!({ "records": records }))).await?;
        Ok(self.parse_records(&data, chunk.len()))
    }

    async fn update_chunk(
        &self,
        chunk: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        let records = chunk
            .iter()
            .map(|envelope| {
                Ok(json!({ "record_id": remote_id(envelope)?, "fields": self.cells(envelope) }))
            })
            .collect::<Result<Vec<Value>>>()?;
        let url = self.table_url("/records/batch_update");
        let data = self.call(Method::POST, url, &[], Some(json!({ "records": records }))).await?;
        Ok(self.parse_records(&data, chunk.len()))
    }
}

#[async_trait]
impl TableAdapter for FeishuAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    #[instrument(skip(self, envelope), fields(platform = "feishu", record_id = %envelope.id))]
    async fn create_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord> {
        let body = json!({ "fields": self.cells(envelope) });
        let data = self.call(Method::POST, self.table_url("/records"), &[], Some(body)).await?;
        self.parse_record(&data["record"])
    }

    #[instrument(skip(self, envelope), fields(platform = "feishu", record_id = %envelope.id))]
    async fn update_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord> {
        let remote_id = remote_id(envelope)?;
        let data = self
            .call(
                Method::PUT,
                self.table_url(&format!("/records/{remote_id}")),
                &[],
                Some(json!({ "fields": self.cells(envelope) })),
            )
            .await?;
        self.parse_record(&data["record"])
    }

    #[instrument(skip(self), fields(platform = "feishu"))]
    async fn delete_record(&self, record_id: &str) -> Result<DeleteResult> {
        let url = self.table_url(&format!("/records/{record_id}"));
        let data = self.call(Method::DELETE, url, &[], None).await?;
        let deleted = data.get("deleted").and_then(Value::as_bool).unwrap_or(true);
        Ok(DeleteResult { success: deleted, deleted_count: usize::from(deleted) })
    }

    #[instrument(skip(self, query), fields(platform = "feishu"))]
    async fn get_records(&self, query: &RecordQuery) -> Result<RecordPage> {
        let mut params = Vec::new();
        if let Some(size) = query.page_size {
            params.push(("page_size", size.to_string()));
        }
        if let Some(token) = &query.page_token {
            params.push(("page_token", token.clone()));
        }
        if let Some(filter) = &query.filter {
            params.push(("filter", filter.clone()));
        }

        let data = self.call(Method::GET, self.table_url("/records"), &params, None).await?;
        let records = data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items.iter().map(|item| self.parse_record(item)).collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(RecordPage {
            records,
            has_more: data.get("has_more").and_then(Value::as_bool).unwrap_or(false),
            page_token: data.get("page_token").and_then(Value::as_str).map(str::to_string),
            total: data.get("total").and_then(Value::as_u64),
        })
    }

    #[instrument(skip(self, envelopes), fields(platform = "feishu", count = envelopes.len()))]
    async fn batch_create(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        chunked(envelopes, FEISHU_BATCH_CAP, self.batch_delay, |chunk| self.create_chunk(chunk))
            .await
    }

    #[instrument(skip(self, envelopes), fields(platform = "feishu", count = envelopes.len()))]
    async fn batch_update(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        chunked(envelopes, FEISHU_BATCH_CAP, self.batch_delay, |chunk| self.update_chunk(chunk))
            .await
    }

    #[instrument(skip(self, record_ids), fields(platform = "feishu", count = record_ids.len()))]
    async fn batch_delete(&self, record_ids: &[String]) -> Result<DeleteResult> {
        let mut deleted_count = 0;
        let chunks: Vec<&[String]> = record_ids.chunks(FEISHU_BATCH_CAP).collect();
        let total = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let url = self.table_url("/records/batch_delete");
            let data = self.call(Method::POST, url, &[], Some(json!({ "records": chunk }))).await?;
            deleted_count += data.get("records").and_then(Value::as_array).map_or(
                chunk.len(),
                |records| {
                    records
                        .iter()
                        .filter(|r| r.get("deleted").and_then(Value::as_bool).unwrap_or(true))
                        .count()
                },
            );
            if index + 1 < total {
                tokio::time::sleep(self.batch_delay).await;
            }
        }
        Ok(DeleteResult { success: deleted_count == record_ids.len(), deleted_count })
    }

    #[instrument(skip(self), fields(platform = "feishu"))]
    async fn test_connection(&self) -> Result<()> {
        self.get_records(&RecordQuery::default().page_size(1)).await.map(|_| ())
    }

    #[instrument(skip(self), fields(platform = "feishu"))]
    async fn get_table_info(&self) -> Result<TableInfo> {
        let data = self.call(Method::GET, self.table_url("/fields"), &[], None).await?;
        let fields = data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| FieldInfo {
                        id: item["field_id"].as_str().unwrap_or_default().to_string(),
                        name: item["field_name"].as_str().unwrap_or_default().to_string(),
                        field_type: item["type"].to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(TableInfo { table_id: self.table_id.clone(), name: None, fields })
    }

    async fn invalidate_token(&self) {
        self.tokens.invalidate().await;
    }
}

fn base_url(config: &PlatformConfig) -> String {
    config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string()
}

fn remote_id(envelope: &PlatformEnvelope) -> Result<&str> {
    envelope.remote_id.as_deref().ok_or_else(|| {
        SyncError::InvalidInput(format!("record {} has no remote id to update", envelope.id))
    })
}

/// Reject non-success replies and non-zero `code` envelopes
fn check(reply: JsonReply) -> Result<Value> {
    let code = reply.body.get("code").and_then(Value::as_i64);
    match code {
        Some(0) | None if reply.is_success() => Ok(reply.body),
        Some(code) if code != 0 => {
            let message = reply.body.get("msg").and_then(Value::as_str).unwrap_or_default();
            Err(classify_code(code, message))
        }
        _ => Err(unexpected_status(PLATFORM, &reply)),
    }
}

/// Map a Feishu business code to an error
pub(crate) fn classify_code(code: i64, message: &str) -> SyncError {
    let platform = PLATFORM.to_string();
    let message = format!("{message} (code {code})");
    match code {
        99_991_661 | 99_991_663 | 99_991_664 | 99_991_665 | 99_991_668 | 99_991_671 | 10_014 => {
            SyncError::Auth { platform, message }
        }
        99_991_400 | 1_254_290 => SyncError::RateLimit { platform, message, retry_after_ms: None },
        91_403 | 1_254_302 | 99_991_672 => SyncError::Permission { platform, message },
        1_254_040 | 1_254_041 | 1_254_043 | 1_254_044 => SyncError::NotFound { platform, message },
        1_255_001 | 1_255_002 => {
            SyncError::Server { platform, kind: ServerErrorKind::Unavailable, message }
        }
        1_255_040 => SyncError::Server { platform, kind: ServerErrorKind::Timeout, message },
        // malformed body or a cell value the field type cannot hold
        1_254_000 | 1_254_001 | 1_254_060..=1_254_068 => {
            SyncError::Server { platform, kind: ServerErrorKind::Rejected, message }
        }
        _ => SyncError::Unknown { platform, code: Some(code.to_string()), message },
    }
}
