//! DingTalk Notable adapter

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tablesync_core::mapping::FieldCodec;
use tablesync_core::{ItemOutcome, TableAdapter};
use tablesync_domain::constants::DEFAULT_ADAPTER_CONCURRENCY;
use tablesync_domain::{
    require_fields, Credentials, DeleteResult, FieldInfo, Platform, PlatformConfig,
    PlatformEnvelope, RecordPage, RecordQuery, RemoteRecord, Result, ServerErrorKind, SyncError,
    TableInfo,
};
use tracing::instrument;

use super::batch::settle_bounded;
use super::rate_limit::RateLimitTracker;
use super::response::{execute, lifetime, millis, unexpected_status, JsonReply};
use super::token::{fingerprint, MintedToken, TokenCache};
use crate::http::HttpClient;

pub const DEFAULT_BASE_URL: &str = "https://api.dingtalk.com";

const PLATFORM: Platform = Platform::Dingtalk;
const TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

/// Adapter for DingTalk Notable sheets
///
/// The API writes one row per call, so batches run as bounded concurrent
/// single-row calls with all-settled semantics.
#[derive(Debug)]
pub struct DingtalkAdapter {
    http: HttpClient,
    base_url: String,
    credentials: Credentials,
    base_id: String,
    sheet_id: String,
    operator_id: String,
    codec: FieldCodec,
    tokens: TokenCache,
    limiter: RateLimitTracker,
    concurrency: usize,
}

impl DingtalkAdapter {
    /// Build an adapter for one connection profile
    ///
    /// # Errors
    /// Returns `SyncError::Configuration` naming every blank required field.
    pub fn new(http: HttpClient, config: &PlatformConfig) -> Result<Self> {
        let operator_id = config.destination.operator_id.clone().unwrap_or_default();
        require_fields(
            PLATFORM,
            &[
                ("app_key", config.credentials.app_id.as_str()),
                ("app_secret", config.credentials.app_secret.as_str()),
                ("base_id", config.destination.workspace_id.as_str()),
                ("sheet_id", config.destination.table_id.as_str()),
                ("operator_id", operator_id.as_str()),
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
            base_id: config.destination.workspace_id.clone(),
            sheet_id: config.destination.table_id.clone(),
            operator_id,
            codec: FieldCodec::for_platform(PLATFORM),
            tokens: TokenCache::new(),
            limiter: RateLimitTracker::new(PLATFORM),
            concurrency: DEFAULT_ADAPTER_CONCURRENCY,
        })
    }

    /// Override how many single-row calls a batch keeps in flight
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn token(&self) -> Result<String> {
        self.tokens.get_or_refresh(&fingerprint(&self.credentials), || self.mint()).await
    }

    async fn mint(&self) -> Result<MintedToken> {
        let url = format!("{}/v1.0/oauth2/accessToken", self.base_url);
        let builder = self.http.request(Method::POST, url).json(&json!({
            "appKey": self.credentials.app_id,
            "appSecret": self.credentials.app_secret,
        }));
        let body = check(execute(&self.http, PLATFORM, &self.limiter, builder).await?)?;

        let token = body
            .get("accessToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::Auth {
                platform: PLATFORM.to_string(),
                message: "token response carried no accessToken".into(),
            })?;
        Ok(MintedToken { token: token.to_string(), expires_in: lifetime(&body["expireIn"]) })
    }

    fn sheet_url(&self, suffix: &str) -> String {
        format!(
            "{}/v1.0/notable/bases/{}/sheets/{}{suffix}",
            self.base_url, self.base_id, self.sheet_id
        )
    }

    async fn call(&self, method: Method, url: String, body: Option<Value>) -> Result<Value> {
        let token = self.token().await?;
        let mut builder = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, token)
            .query(&[("operatorId", self.operator_id.as_str())]);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let result = execute(&self.http, PLATFORM, &self.limiter, builder).await.and_then(check);
        if let Err(SyncError::Auth { .. }) = &result {
            self.tokens.invalidate().await;
        }
        result
    }

    fn cells(&self, envelope: &PlatformEnvelope) -> Map<String, Value> {
        self.codec.encode(&envelope.logical_fields())
    }

    fn parse_record(&self, value: &Value) -> Result<RemoteRecord> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Deserialization("dingtalk record without id".into()))?;
        let fields = value.get("fields").and_then(Value::as_object).cloned().unwrap_or_default();

        Ok(RemoteRecord::new(id, self.codec.decode(&fields)).with_times_millis(
            value.get("createdTime").and_then(millis),
            value.get("lastModifiedTime").and_then(millis),
        ))
    }

    /// First row id of a `{ value: [{ id }] }` reply
    fn written(&self, body: &Value, fields: Map<String, Value>) -> Result<RemoteRecord> {
        let id = body
            .get("value")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Deserialization("dingtalk write returned no row id".into()))?;
        Ok(RemoteRecord::new(id, self.codec.decode(&fields)))
    }
}

#[async_trait]
impl TableAdapter for DingtalkAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    #[instrument(skip(self, envelope), fields(platform = "dingtalk", record_id = %envelope.id))]
    async fn create_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord> {
        let fields = self.cells(envelope);
        let body = json!({ "records": [{ "fields": fields }] });
        let reply = self.call(Method::POST, self.sheet_url("/records"), Some(body)).await?;
        self.written(&reply, fields)
    }

    #[instrument(skip(self, envelope), fields(platform = "dingtalk", record_id = %envelope.id))]
    async fn update_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord> {
        let remote_id = envelope.remote_id.as_deref().ok_or_else(|| {
            SyncError::InvalidInput(format!("record {} has no remote id to update", envelope.id))
        })?;
        let fields = self.cells(envelope);
        let body = json!({ "records": [{ "id": remote_id, "fields": fields }] });
        self.call(Method::PUT, self.sheet_url("/records"), Some(body)).await?;
        Ok(RemoteRecord::new(remote_id, self.codec.decode(&fields)))
    }

    #[instrument(skip(self), fields(platform = "dingtalk"))]
    async fn delete_record(&self, record_id: &str) -> Result<DeleteResult> {
        self.batch_delete(&[record_id.to_string()]).await
    }

    #[instrument(skip(self, query), fields(platform = "dingtalk"))]
    async fn get_records(&self, query: &RecordQuery) -> Result<RecordPage> {
        let mut body = Map::new();
        if let Some(size) = query.page_size {
            body.insert("maxResults".into(), json!(size));
        }
        if let Some(token) = &query.page_token {
            body.insert("nextToken".into(), json!(token));
        }
        if let Some(filter) = &query.filter {
            body.insert("filter".into(), json!(filter));
        }

        let url = self.sheet_url("/records/list");
        let reply = self.call(Method::POST, url, Some(Value::Object(body))).await?;
        let records = reply
            .get("records")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(|row| self.parse_record(row)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        Ok(RecordPage {
            records,
            has_more: reply.get("hasMore").and_then(Value::as_bool).unwrap_or(false),
            page_token: reply.get("nextToken").and_then(Value::as_str).map(str::to_string),
            total: None,
        })
    }

    #[instrument(skip(self, envelopes), fields(platform = "dingtalk", count = envelopes.len()))]
    async fn batch_create(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        // Mint once up front so a bad credential aborts the batch
        self.token().await?;
        Ok(settle_bounded(envelopes, self.concurrency, |envelope| self.create_record(envelope))
            .await)
    }

    #[instrument(skip(self, envelopes), fields(platform = "dingtalk", count = envelopes.len()))]
    async fn batch_update(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        self.token().await?;
        Ok(settle_bounded(envelopes, self.concurrency, |envelope| self.update_record(envelope))
            .await)
    }

    #[instrument(skip(self, record_ids), fields(platform = "dingtalk", count = record_ids.len()))]
    async fn batch_delete(&self, record_ids: &[String]) -> Result<DeleteResult> {
        let body = json!({ "recordIds": record_ids });
        let reply = self.call(Method::POST, self.sheet_url("/records/delete"), Some(body)).await?;
        let success = reply.get("success").and_then(Value::as_bool).unwrap_or(true);
        Ok(DeleteResult { success, deleted_count: if success { record_ids.len() } else { 0 } })
    }

    #[instrument(skip(self), fields(platform = "dingtalk"))]
    async fn test_connection(&self) -> Result<()> {
        self.get_records(&RecordQuery::default().page_size(1)).await.map(|_| ())
    }

    #[instrument(skip(self), fields(platform = "dingtalk"))]
    async fn get_table_info(&self) -> Result<TableInfo> {
        let reply = self.call(Method::GET, self.sheet_url("/fields"), None).await?;
        let fields = reply
            .get("value")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| FieldInfo {
                        id: item["id"].as_str().unwrap_or_default().to_string(),
                        name: item["name"].as_str().unwrap_or_default().to_string(),
                        field_type: item["type"].as_str().unwrap_or_default().to_string(),
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

/// Reject replies carrying an error `code`
fn check(reply: JsonReply) -> Result<Value> {
    let code = reply.body.get("code").and_then(Value::as_str).map(str::to_string);
    match code {
        Some(code) => {
            let message = reply.body.get("message").and_then(Value::as_str).unwrap_or_default();
            Err(classify_code(&code, message))
        }
        None if reply.is_success() => Ok(reply.body),
        None => Err(unexpected_status(PLATFORM, &reply)),
    }
}

/// Map a DingTalk error code to an error
pub(crate) fn classify_code(code: &str, message: &str) -> SyncError {
    let platform = PLATFORM.to_string();
    let message = format!("{message} ({code})");
    if code == "InvalidAuthentication" || code.contains("AccessToken") {
        SyncError::Auth { platform, message }
    } else if code.starts_with("Throttling") {
        SyncError::RateLimit { platform, message, retry_after_ms: None }
    } else if code.starts_with("Forbidden") {
        SyncError::Permission { platform, message }
    } else if code.contains("NotFound") {
        SyncError::NotFound { platform, message }
    } else if code == "ServiceUnavailable" {
        SyncError::Server { platform, kind: ServerErrorKind::Unavailable, message }
    } else if code.contains("Timeout") {
        SyncError::Server { platform, kind: ServerErrorKind::Timeout, message }
    } else if code == "InternalError" {
        SyncError::Server { platform, kind: ServerErrorKind::Status(500), message }
    } else if code.starts_with("InvalidParameter") || code == "invalidRequest" {
        SyncError::Server { platform, kind: ServerErrorKind::Rejected, message }
    } else {
        SyncError::Unknown { platform, code: Some(code.to_string()), message }
    }
}

#[cfg(test)]
mod tests {
    use tablesync_domain::ErrorKind;

    use super::*;

    #[test]
    fn classifies_string_codes() {
        assert_eq!(classify_code("InvalidAuthentication", "").kind(), ErrorKind::Auth);
        assert_eq!(classify_code("InvalidAccessToken", "").kind(), ErrorKind::Auth);
        assert_eq!(classify_code("Throttling.Api", "").kind(), ErrorKind::RateLimit);
        assert_eq!(classify_code("Forbidden.AccessDenied", "").kind(), ErrorKind::Permission);
        assert_eq!(classify_code("Sheet.NotFound", "").kind(), ErrorKind::NotFound);
        assert!(classify_code("ServiceUnavailable", "").is_retryable());
        assert!(classify_code("InternalError", "").is_retryable());

        let rejected = classify_code("InvalidParameter.Value", "bad cell");
        assert!(matches!(rejected, SyncError::Server { kind: ServerErrorKind::Rejected, .. }));
        assert!(!rejected.is_retryable());

        let unknown = classify_code("Sheet.Locked", "locked");
        assert_eq!(unknown.kind(), ErrorKind::Unknown);
        assert_eq!(unknown.platform(), Some("dingtalk"));
        assert!(unknown.to_string().contains("Sheet.Locked"));
    }

    #[test]
    fn operator_id_is_required() {
        let config = PlatformConfig::new("cfg", Platform::Dingtalk)
            .with_credentials("key", "secret")
            .with_destination("base", "sheet");
        let error = DingtalkAdapter::new(HttpClient::new().unwrap(), &config).unwrap_err();
        assert_eq!(
            error,
            SyncError::Configuration {
                platform: "dingtalk".into(),
                missing: vec!["operator_id".into()],
            }
        );
    }
}
