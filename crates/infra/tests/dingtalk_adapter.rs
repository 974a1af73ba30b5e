//! DingTalk adapter against a mock Notable server

mod support;

use serde_json::{json, Value};
use support::{dingtalk_config, envelope, envelopes, http, mount_dingtalk_token};
use tablesync_core::TableAdapter;
use tablesync_domain::{ErrorKind, RecordQuery};
use tablesync_infra::DingtalkAdapter;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const RECORDS: &str = "/v1.0/notable/bases/base1/sheets/sheet1/records";

fn adapter(server: &MockServer) -> DingtalkAdapter {
    DingtalkAdapter::new(http(), &dingtalk_config(server)).unwrap()
}

/// Answer with a row id derived from the written record id, failing `r3`
fn row_per_record(request: &Request) -> ResponseTemplate {
    let body: Value = request.body_json().unwrap();
    let record_id = body["records"][0]["fields"]["Record ID"].as_str().unwrap_or_default();
    if record_id == "r3" {
        return ResponseTemplate::new(400)
            .set_body_json(json!({ "code": "InvalidParameter", "message": "bad cell" }));
    }
    ResponseTemplate::new(200)
        .set_body_json(json!({ "value": [{ "id": format!("row_{record_id}") }] }))
}

#[tokio::test]
async fn create_sends_token_header_and_operator() {
    let server = MockServer::start().await;
    mount_dingtalk_token(&server, "ding-token", 1).await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .and(header("x-acs-dingtalk-access-token", "ding-token"))
        .and(query_param("operatorId", "union1"))
        .and(body_partial_json(json!({
            "records": [{ "fields": { "Record ID": "r1", "Type": "rewrite" } }]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "id": "row1" }] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = adapter(&server).create_record(&envelope("r1")).await.unwrap();
    assert_eq!(record.id, "row1");
    assert_eq!(record.fields["id"], "r1");
}

#[tokio::test]
async fn batch_create_settles_every_row() {
    let server = MockServer::start().await;
    mount_dingtalk_token(&server, "t", 1).await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(row_per_record)
        .expect(7)
        .mount(&server)
        .await;

    let outcomes = adapter(&server).with_concurrency(3).batch_create(&envelopes(7)).await.unwrap();

    assert_eq!(outcomes.len(), 7);
    assert_eq!(outcomes[0].as_ref().unwrap().id, "row_r0");
    assert_eq!(outcomes[6].as_ref().unwrap().id, "row_r6");
    let failure = outcomes[3].as_ref().unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Server);
    assert!(!failure.is_retryable(), "rejected rows are not retried");
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_err()).count(), 1);
}

#[tokio::test]
async fn bad_credentials_abort_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/oauth2/accessToken"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "code": "InvalidAuthentication", "message": "bad key" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let error = adapter(&server).batch_create(&envelopes(3)).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Auth);
}

#[tokio::test]
async fn throttling_code_is_rate_limit() {
    let server = MockServer::start().await;
    mount_dingtalk_token(&server, "t", 1).await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "code": "Throttling.Api", "message": "slow down" })),
        )
        .mount(&server)
        .await;

    let error = adapter(&server).create_record(&envelope("r1")).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RateLimit);
    assert!(error.is_retryable());
}

#[tokio::test]
async fn forbidden_status_is_permission() {
    let server = MockServer::start().await;
    mount_dingtalk_token(&server, "t", 1).await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "code": "Forbidden.AccessDenied", "message": "no" })),
        )
        .mount(&server)
        .await;

    let error = adapter(&server).create_record(&envelope("r1")).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Permission);
}

#[tokio::test]
async fn list_and_delete() {
    let server = MockServer::start().await;
    mount_dingtalk_token(&server, "t", 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{RECORDS}/list")))
        .and(body_partial_json(json!({ "maxResults": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{ "id": "row1", "fields": { "Name": "first" } }],
            "hasMore": true,
            "nextToken": "n2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{RECORDS}/delete")))
        .and(body_partial_json(json!({ "recordIds": ["row1", "row2"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let page = adapter.get_records(&RecordQuery::default().page_size(1)).await.unwrap();
    assert_eq!(page.records[0].fields["name"], "first");
    assert_eq!(page.page_token.as_deref(), Some("n2"));

    let deleted = adapter.batch_delete(&["row1".into(), "row2".into()]).await.unwrap();
    assert!(deleted.success);
    assert_eq!(deleted.deleted_count, 2);
}
