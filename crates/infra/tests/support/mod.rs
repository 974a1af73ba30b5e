//! Shared fixtures for the HTTP adapter tests
#![allow(dead_code)]

use serde_json::{json, Map, Value};
use tablesync_core::DataMapper;
use tablesync_domain::{LocalRecord, Platform, PlatformConfig, PlatformEnvelope, RecordType};
use tablesync_infra::HttpClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn http() -> HttpClient {
    HttpClient::with_timeout(std::time::Duration::from_secs(5), "tablesync-test").unwrap()
}

pub fn rewrite_record(id: &str) -> LocalRecord {
    let fields: Map<String, Value> = match json!({
        "original_text": format!("original {id}"),
        "rewritten_text": format!("rewritten {id}"),
        "model_id": "gpt-4o-mini",
        "tags": ["demo", "batch"],
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    LocalRecord::new(RecordType::Rewrite, fields).with_id(id)
}

pub fn envelope(id: &str) -> PlatformEnvelope {
    DataMapper::new().serialize(&rewrite_record(id), RecordType::Rewrite).unwrap()
}

pub fn envelopes(count: usize) -> Vec<PlatformEnvelope> {
    (0..count).map(|index| envelope(&format!("r{index}"))).collect()
}

pub fn feishu_config(server: &MockServer) -> PlatformConfig {
    PlatformConfig::new("team-base", Platform::Feishu)
        .with_credentials("cli_app", "secret")
        .with_destination("bascn123", "tbl456")
        .with_base_url(server.uri())
}

pub fn dingtalk_config(server: &MockServer) -> PlatformConfig {
    PlatformConfig::new("ding-base", Platform::Dingtalk)
        .with_credentials("ding_key", "secret")
        .with_destination("base1", "sheet1")
        .with_operator("union1")
        .with_base_url(server.uri())
}

pub fn wecom_config(server: &MockServer) -> PlatformConfig {
    PlatformConfig::new("corp-sheet", Platform::Wecom)
        .with_credentials("ww_corp", "secret")
        .with_destination("doc1", "sheet1")
        .with_base_url(server.uri())
}

pub async fn mount_feishu_token(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "tenant_access_token": token,
            "expire": 7200
        })))
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_dingtalk_token(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/v1.0/oauth2/accessToken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": token, "expireIn": 7200 })),
        )
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_wecom_token(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/gettoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 0,
            "errmsg": "ok",
            "access_token": token,
            "expires_in": 7200
        })))
        .expect(expected)
        .mount(server)
        .await;
}
