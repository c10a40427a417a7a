#![allow(clippy::unwrap_used)]
// Integration tests for `PostgrestClient` using wiremock.

use serde::Deserialize;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use netorch_api::{Error, PostgrestClient, Query, TlsMode, TransportConfig};

#[derive(Debug, Deserialize)]
struct Row {
    id: i64,
    status: String,
}

async fn setup() -> (MockServer, PostgrestClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/rest/v1", server.uri())).unwrap();
    let transport = TransportConfig {
        tls: TlsMode::System,
        ..TransportConfig::default()
    };
    let key: secrecy::SecretString = "service-key".to_string().into();
    let client = PostgrestClient::new(base_url, &key, &transport).unwrap();
    (server, client)
}

#[tokio::test]
async fn test_select_sends_filters_and_auth() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .and(query_param("status", "eq.active"))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "status": "active" },
            { "id": 2, "status": "active" }
        ])))
        .mount(&server)
        .await;

    let rows: Vec<Row> = client
        .select("clients", &Query::new().eq("status", "active"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id, 2);
    assert_eq!(rows[0].status, "active");
}

#[tokio::test]
async fn test_insert_asks_for_representation() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/network_events"))
        .and(header("prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "id": 10, "status": "ok" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows: Vec<Row> = client
        .insert("network_events", &json!({ "event_type": "qos_applied" }))
        .await
        .unwrap();
    assert_eq!(rows[0].id, 10);
}

#[tokio::test]
async fn test_update_counts_rows() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/equipment"))
        .and(query_param("id", "eq.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 7, "status": "offline" }
        ])))
        .mount(&server)
        .await;

    let touched = client
        .update("equipment", &Query::new().eq("id", 7), &json!({ "status": "offline" }))
        .await
        .unwrap();
    assert_eq!(touched, 1);
}

#[tokio::test]
async fn test_error_body_is_decoded() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "42P01",
            "message": "relation \"public.nope\" does not exist",
            "details": null,
            "hint": null
        })))
        .mount(&server)
        .await;

    let err = client
        .select::<Row>("nope", &Query::new())
        .await
        .unwrap_err();
    match err {
        Error::Postgrest { status, code, .. } => {
            assert_eq!(status, 404);
            assert_eq!(code.as_deref(), Some("42P01"));
        }
        other => panic!("expected Postgrest error, got: {other:?}"),
    }
}
