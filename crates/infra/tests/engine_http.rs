//! End-to-end sync against a mocked Feishu API
//!
//! Wires the real engine, HTTP adapter factory and in-memory store together
//! so requests travel the full stack down to wiremock.

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use support::{feishu_config, mount_feishu_token, rewrite_record};
use tablesync_core::{load_collection, save_collection, SyncEngine, SyncOptions, TableService};
use tablesync_domain::constants::RECORDS_KEY;
use tablesync_domain::config::HttpConfig;
use tablesync_domain::{EngineConfig, ErrorKind, JobStatus, LocalRecord, RecordSyncStatus};
use tablesync_infra::{HttpAdapterFactory, MemoryStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const RECORDS: &str = "/open-apis/bitable/v1/apps/bascn123/tables/tbl456/records";
const BATCH_CREATE: &str = "/open-apis/bitable/v1/apps/bascn123/tables/tbl456/records/batch_create";

fn engine(store: Arc<MemoryStore>) -> SyncEngine {
    let factory = HttpAdapterFactory::new(&HttpConfig::default()).unwrap();
    let service = Arc::new(TableService::new(Arc::new(factory)).with_store(store.clone()));
    SyncEngine::new(service, store, EngineConfig::default()).unwrap()
}

fn fast() -> SyncOptions {
    SyncOptions::new().batch_delay(Duration::ZERO).base_delay(Duration::from_millis(10))
}

fn created(request: &Request) -> ResponseTemplate {
    let body: Value = request.body_json().unwrap();
    let record_id = body["fields"]["记录ID"].as_str().unwrap_or_default();
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 0,
        "msg": "ok",
        "data": { "record": { "record_id": format!("rec_{record_id}"), "fields": body["fields"] } }
    }))
}

fn batch_created(request: &Request) -> ResponseTemplate {
    let body: Value = request.body_json().unwrap();
    let records: Vec<Value> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| {
            let record_id = row["fields"]["记录ID"].as_str().unwrap_or_default();
            json!({ "record_id": format!("rec_{record_id}"), "fields": row["fields"] })
        })
        .collect();
    ResponseTemplate::new(200)
        .set_body_json(json!({ "code": 0, "msg": "ok", "data": { "records": records } }))
}

#[tokio::test]
async fn test_sync_single_retries_transient_failure() {
    let server = MockServer::start().await;
    mount_feishu_token(&server, "t-1", 1).await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(created)
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(Arc::new(MemoryStore::new()));
    let receipt =
        engine.sync_single(&rewrite_record("r1"), &feishu_config(&server), &fast()).await.unwrap();

    assert_eq!(receipt.attempts, 2);
    assert_eq!(receipt.status, JobStatus::Success);
    assert_eq!(receipt.result.id, "rec_r1");
}

#[tokio::test]
async fn test_smart_sync_uses_native_batches() {
    let server = MockServer::start().await;
    mount_feishu_token(&server, "t-1", 1).await;
    Mock::given(method("POST"))
        .and(path(BATCH_CREATE))
        .respond_with(batch_created)
        .expect(3)
        .mount(&server)
        .await;

    let records: Vec<LocalRecord> =
        (0..25).map(|index| rewrite_record(&format!("r{index}"))).collect();
    let engine = engine(Arc::new(MemoryStore::new()));
    let job = engine.smart_sync(&records, &feishu_config(&server), &fast()).await.unwrap();

    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.success_count, 25);
    assert_eq!(job.results[24].remote_id.as_deref(), Some("rec_r24"));
}

#[tokio::test]
async fn test_sync_all_writes_remote_ids_back() {
    let server = MockServer::start().await;
    mount_feishu_token(&server, "t-1", 1).await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(created)
        .expect(3)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let records = vec![rewrite_record("a"), rewrite_record("b"), rewrite_record("c")];
    save_collection(store.as_ref(), RECORDS_KEY, &records).await.unwrap();

    let engine = engine(Arc::clone(&store));
    let job = engine.sync_all(&feishu_config(&server), &fast()).await.unwrap();
    assert_eq!(job.success_count, 3);

    let stored: Vec<LocalRecord> = load_collection(store.as_ref(), RECORDS_KEY).await.unwrap();
    for record in &stored {
        assert_eq!(record.sync.status, RecordSyncStatus::Synced);
        assert_eq!(record.sync.remote_ids["feishu:team-base"], format!("rec_{}", record.id));
    }
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 10014, "msg": "app secret invalid" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(Arc::new(MemoryStore::new()));
    let failure = engine
        .sync_single(&rewrite_record("r1"), &feishu_config(&server), &fast())
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 1);
    assert_eq!(failure.error.kind(), ErrorKind::Auth);
}
