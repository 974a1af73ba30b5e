//! WeCom Smart Sheet adapter

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tablesync_core::mapping::{flatten_text_segments, FieldCodec};
use tablesync_core::{ItemOutcome, TableAdapter};
use tablesync_domain::constants::{
    DEFAULT_ADAPTER_CONCURRENCY, WECOM_BATCH_CAP, WECOM_CHUNK_DELAY_MS,
};
use tablesync_domain::{
    require_fields, Credentials, DeleteResult, FieldInfo, Platform, PlatformConfig,
    PlatformEnvelope, RecordPage, RecordQuery, RemoteRecord, Result, ServerErrorKind, SyncError,
    TableInfo,
};
use tracing::instrument;

use super::batch::{chunked, settle_bounded};
use super::rate_limit::RateLimitTracker;
use super::response::{execute, lifetime, millis, unexpected_status, JsonReply};
use super::token::{fingerprint, MintedToken, TokenCache};
use crate::http::HttpClient;

pub const DEFAULT_BASE_URL: &str = "https://qyapi.weixin.qq.com";

const PLATFORM: Platform = Platform::Wecom;
const SHEET_PATH: &str = "/cgi-bin/wedoc/smartsheet";
const KEY_TYPE: &str = "CELL_VALUE_KEY_TYPE_FIELD_TITLE";

/// Adapter for WeCom Smart Sheets
///
/// Batches are cut into chunks of [`WECOM_BATCH_CAP`] rows; rows inside a
/// chunk are written by bounded concurrent single-row calls, with a pause
/// between chunks.
#[derive(Debug)]
pub struct WecomAdapter {
    http: HttpClient,
    base_url: String,
    credentials: Credentials,
    doc_id: String,
    sheet_id: String,
    codec: FieldCodec,
    tokens: TokenCache,
    limiter: RateLimitTracker,
    concurrency: usize,
    chunk_delay: Duration,
}

impl WecomAdapter {
    /// Build an adapter for one connection profile
    ///
    /// # Errors
    /// Returns `SyncError::Configuration` naming every blank required field.
    pub fn new(http: HttpClient, config: &PlatformConfig) -> Result<Self> {
        require_fields(
            PLATFORM,
            &[
                ("corp_id", config.credentials.app_id.as_str()),
                ("corp_secret", config.credentials.app_secret.as_str()),
                ("doc_id", config.destination.workspace_id.as_str()),
                ("sheet_id", config.destination.table_id.as_str()),
            ],
        )?;

        Ok(Self {
            http,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            credentials: config.credentials.clone(),
            doc_id: config.destination.workspace_id.clone(),
            sheet_id: config.destination.table_id.clone(),
            codec: FieldCodec::for_platform(PLATFORM),
            tokens: TokenCache::new(),
            limiter: RateLimitTracker::new(PLATFORM),
            concurrency: DEFAULT_ADAPTER_CONCURRENCY,
            chunk_delay: Duration::from_millis(WECOM_CHUNK_DELAY_MS),
        })
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub const fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Override the local request budget
    #[must_use]
    pub fn with_requests_per_second(mut self, requests_per_second: u32) -> Self {
        self.limiter = RateLimitTracker::with_limit(PLATFORM, requests_per_second);
        self
    }

    async fn token(&self) -> Result<String> {
        self.tokens.get_or_refresh(&fingerprint(&self.credentials), || self.mint()).await
    }

    async fn mint(&self) -> Result<MintedToken> {
        let url = format!("{}/cgi-bin/gettoken", self.base_url);
        let builder = self.http.request(Method::GET, url).query(&[
            ("corpid", self.credentials.app_id.as_str()),
            ("corpsecret", self.credentials.app_secret.as_str()),
        ]);
        let body = check(execute(&self.http, PLATFORM, &self.limiter, builder).await?)?;

        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::Auth {
                platform: PLATFORM.to_string(),
                message: "token response carried no access_token".into(),
            })?;
        Ok(MintedToken { token: token.to_string(), expires_in: lifetime(&body["expires_in"]) })
    }

    /// POST to a smart-sheet endpoint with the document and sheet ids merged in
    async fn call(&self, endpoint: &str, mut body: Map<String, Value>) -> Result<Value> {
        let token = self.token().await?;
        body.insert("docid".into(), json!(self.doc_id));
        body.insert("sheet_id".into(), json!(self.sheet_id));

        let builder = self
            .http
            .request(Method::POST, format!("{}{SHEET_PATH}/{endpoint}", self.base_url))
            .query(&[("access_token", token)])
            .json(&Value::Object(body));

        let result = execute(&self.http, PLATFORM, &self.limiter, builder).await.and_then(check);
        if let Err(SyncError::Auth { .. }) = &result {
            self.tokens.invalidate().await;
        }
        result
    }

    /// Logical fields as `{ title: [{ type: "text", text }] }` cell values
    fn cells(&self, envelope: &PlatformEnvelope) -> Map<String, Value> {
        self.codec
            .encode(&envelope.logical_fields())
            .into_iter()
            .map(|(title, value)| (title, json!([{ "type": "text", "text": value }])))
            .collect()
    }

    fn parse_record(&self, value: &Value) -> Result<RemoteRecord> {
        let id = value
            .get("record_id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Deserialization("wecom record without record_id".into()))?;
        let cells: Map<String, Value> = value
            .get("values")
            .and_then(Value::as_object)
            .map(|values| {
                values.iter().map(|(k, v)| (k.clone(), flatten_text_segments(v.clone()))).collect()
            })
            .unwrap_or_default();

        Ok(RemoteRecord::new(id, self.codec.decode(&cells)).with_times_millis(
            value.get("create_time").and_then(millis),
            value.get("update_time").and_then(millis),
        ))
    }

    fn first_record(&self, reply: &Value) -> Result<RemoteRecord> {
        let record = reply
            .get("records")
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .ok_or_else(|| SyncError::Deserialization("wecom write returned no records".into()))?;
        self.parse_record(record)
    }

    async fn chunk_of<'a, F, Fut>(
        &self,
        envelopes: &'a [PlatformEnvelope],
        write: F,
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>>
    where
        F: Fn(&'a PlatformEnvelope) -> Fut + Copy,
        Fut: std::future::Future<Output = Result<RemoteRecord>>,
    {
        self.token().await?;
        let concurrency = self.concurrency;
        chunked(envelopes, WECOM_BATCH_CAP, self.chunk_delay, move |chunk| async move {
            Ok(settle_bounded(chunk, concurrency, write).await)
        })
        .await
    }
}

#[async_trait]
impl TableAdapter for WecomAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    #[instrument(skip(self, envelope), fields(platform = "wecom", record_id = %envelope.id))]
    async fn create_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord> {
        let mut body = Map::new();
        body.insert("key_type".into(), json!(KEY_TYPE));
        body.insert("records".into(), json!([{ "values": self.cells(envelope) }]));
        let reply = self.call("add_records", body).await?;
        self.first_record(&reply)
    }

    #[instrument(skip(self, envelope), fields(platform = "wecom", record_id = %envelope.id))]
    async fn update_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord> {
        let remote_id = envelope.remote_id.as_deref().ok_or_else(|| {
            SyncError::InvalidInput(format!("record {} has no remote id to update", envelope.id))
        })?;
        let mut body = Map::new();
        body.insert("key_type".into(), json!(KEY_TYPE));
        body.insert(
            "records".into(),
            json!([{ "record_id": remote_id, "values": self.cells(envelope) }]),
        );
        let reply = self.call("update_records", body).await?;
        self.first_record(&reply)
    }

    #[instrument(skip(self), fields(platform = "wecom"))]
    async fn delete_record(&self, record_id: &str) -> Result<DeleteResult> {
        self.batch_delete(&[record_id.to_string()]).await
    }

    #[instrument(skip(self, query), fields(platform = "wecom"))]
    async fn get_records(&self, query: &RecordQuery) -> Result<RecordPage> {
        let offset: u64 = query.page_token.as_deref().and_then(|t| t.parse().ok()).unwrap_or(0);
        let mut body = Map::new();
        body.insert("key_type".into(), json!(KEY_TYPE));
        body.insert("offset".into(), json!(offset));
        if let Some(size) = query.page_size {
            body.insert("limit".into(), json!(size));
        }

        let reply = self.call("get_records", body).await?;
        let records = reply
            .get("records")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(|row| self.parse_record(row)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();
        let has_more = reply.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        let next = reply
            .get("next")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| {
                offset.saturating_add(u64::try_from(records.len()).unwrap_or(u64::MAX))
            });

        Ok(RecordPage {
            records,
            has_more,
            page_token: has_more.then(|| next.to_string()),
            total: reply.get("total").and_then(Value::as_u64),
        })
    }

    #[instrument(skip(self, envelopes), fields(platform = "wecom", count = envelopes.len()))]
    async fn batch_create(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        self.chunk_of(envelopes, |envelope| self.create_record(envelope)).await
    }

    #[instrument(skip(self, envelopes), fields(platform = "wecom", count = envelopes.len()))]
    async fn batch_update(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        self.chunk_of(envelopes, |envelope| self.update_record(envelope)).await
    }

    #[instrument(skip(self, record_ids), fields(platform = "wecom", count = record_ids.len()))]
    async fn batch_delete(&self, record_ids: &[String]) -> Result<DeleteResult> {
        let mut deleted_count = 0;
        let chunks: Vec<&[String]> = record_ids.chunks(WECOM_BATCH_CAP).collect();
        let total = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut body = Map::new();
            body.insert("record_ids".into(), json!(chunk));
            self.call("delete_records", body).await?;
            deleted_count += chunk.len();
            if index + 1 < total {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }
        Ok(DeleteResult { success: true, deleted_count })
    }

    #[instrument(skip(self), fields(platform = "wecom"))]
    async fn test_connection(&self) -> Result<()> {
        self.get_records(&RecordQuery::default().page_size(1)).await.map(|_| ())
    }

    #[instrument(skip(self), fields(platform = "wecom"))]
    async fn get_table_info(&self) -> Result<TableInfo> {
        let reply = self.call("get_fields", Map::new()).await?;
        let fields = reply
            .get("fields")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| FieldInfo {
                        id: item["field_id"].as_str().unwrap_or_default().to_string(),
                        name: item["field_title"].as_str().unwrap_or_default().to_string(),
                        field_type: item["field_type"].as_str().unwrap_or_default().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(TableInfo { table_id: self.sheet_id.clone(), name: None, fields })
    }

    async fn invalidate_token(&self) {
        self.tokens.invalidate().await;
    }
}

/// Reject replies with a non-zero `errcode`
fn check(reply: JsonReply) -> Result<Value> {
    let code = reply.body.get("errcode").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = reply.body.get("errmsg").and_then(Value::as_str).unwrap_or_default();
        return Err(classify_code(code, message));
    }
    if reply.is_success() {
        Ok(reply.body)
    } else {
        Err(unexpected_status(PLATFORM, &reply))
    }
}

/// Map a WeCom `errcode` to an error
pub(crate) fn classify_code(code: i64, message: &str) -> SyncError {
    let platform = PLATFORM.to_string();
    let not_exist = message.contains("not exist");
    let message = format!("{message} (errcode {code})");
    match code {
        40_001 | 40_014 | 42_001 | 41_001 => SyncError::Auth { platform, message },
        45_009 | 45_033 => SyncError::RateLimit { platform, message, retry_after_ms: None },
        48_002 | 60_011 | 60_020 => SyncError::Permission { platform, message },
        640_014 => SyncError::NotFound { platform, message },
        -1 => SyncError::Server { platform, kind: ServerErrorKind::Unavailable, message },
        40_058 => SyncError::Server { platform, kind: ServerErrorKind::Rejected, message },
        _ if not_exist => SyncError::NotFound { platform, message },
        _ => SyncError::Unknown { platform, code: Some(code.to_string()), message },
    }
}
