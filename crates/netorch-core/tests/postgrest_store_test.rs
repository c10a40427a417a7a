#![allow(clippy::unwrap_used)]
// PostgrestStore against a mocked PostgREST endpoint.

use chrono::{TimeZone, Utc};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use netorch_api::{PostgrestClient, TlsMode, TransportConfig};
use netorch_core::store::NetworkStore;
use netorch_core::{
    Actor, ClientId, ClientStatus, CoreError, DeviceId, EventKind, PackageId, PostgrestStore,
    Reachability,
};

async fn setup() -> (MockServer, PostgrestStore) {
    let server = MockServer::start().await;
    let base = Url::parse(&format!("{}/rest/v1", server.uri())).unwrap();
    let transport = TransportConfig {
        tls: TlsMode::System,
        ..TransportConfig::default()
    };
    let key: secrecy::SecretString = "service-key".to_string().into();
    let client = PostgrestClient::new(base, &key, &transport).unwrap();
    (server, PostgrestStore::new(client))
}

#[tokio::test]
async fn reads_clients_packages_and_assignments_with_numeric_keys() {
    let (server, store) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .and(query_param("id", "eq.7"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 7,
            "status": "active",
            "service_package_id": 3,
            "pppoe_username": "jane.k",
            "ip_address": "100.64.0.7"
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/service_packages"))
        .and(query_param("id", "eq.3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 3,
            "name": "Home 30",
            "speed": "30 Mbps",
            "data_cap_gb": 100.0
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/client_equipment"))
        .and(query_param("client_id", "eq.7"))
        .and(query_param("select", "equipment_id"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "equipment_id": 11 }, { "equipment_id": "12" }])),
        )
        .mount(&server)
        .await;

    let client = store.get_client(&ClientId::from(7)).await.unwrap().unwrap();
    assert_eq!(client.status, ClientStatus::Active);
    assert_eq!(client.service_package_id, Some(PackageId::from(3)));
    assert_eq!(client.secret_name(), "jane.k");

    let package = store.get_package(&PackageId::from(3)).await.unwrap().unwrap();
    assert_eq!(package.speed, "30 Mbps");
    assert_eq!(package.data_cap_gb, Some(100.0));

    let devices = store.assigned_devices(&client.id).await.unwrap();
    assert_eq!(devices, vec![DeviceId::from(11), DeviceId::from("12")]);
}

#[tokio::test]
async fn missing_client_is_none() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(store.get_client(&ClientId::from(404)).await.unwrap().is_none());
}

#[tokio::test]
async fn status_update_touching_no_rows_is_not_found() {
    let (server, store) = setup().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/clients"))
        .and(query_param("id", "eq.9"))
        .and(body_json(json!({ "status": "suspended" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = store
        .update_client_status(&ClientId::from(9), ClientStatus::Suspended)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ClientNotFound { .. }));
}

#[tokio::test]
async fn device_status_patch_carries_last_seen() {
    let (server, store) = setup().await;
    let seen = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/equipment"))
        .and(query_param("id", "eq.11"))
        .and(body_json(json!({ "status": "online", "last_seen": seen })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 11 }])))
        .expect(1)
        .mount(&server)
        .await;

    store
        .update_device_status(&DeviceId::from(11), Reachability::Online, Some(seen))
        .await
        .unwrap();
}

#[tokio::test]
async fn usage_since_sums_both_directions() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/client_usage"))
        .and(query_param("client_id", "eq.7"))
        .and(query_param("select", "bytes_in,bytes_out"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "bytes_in": 1_000, "bytes_out": 200 },
            { "bytes_in": 500, "bytes_out": 0 },
            { "bytes_in": 300 }
        ])))
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    let total = store.usage_since(&ClientId::from(7), since).await.unwrap();
    assert_eq!(total, 2_000);
}

#[tokio::test]
async fn recent_events_decode_both_payload_columns() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/network_events"))
        .and(query_param("order", "timestamp.desc"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "6f1c1e0a-8c1b-4f3e-9a57-0d6a3b8f2e11",
                "client_id": null,
                "device_id": "11",
                "triggered_by": "health_monitor",
                "event_type": "device_status_changed",
                "event_data": { "previous": "online", "current": "offline" },
                "success": true,
                "timestamp": "2026-10-01T08:05:00Z"
            },
            {
                "id": "0b7f6f2c-54c4-4a4e-8f0e-7d3c2a1b9e00",
                "client_id": "7",
                "device_id": "11",
                "triggered_by": "operator:noc",
                "event_type": "data_cap_warning",
                "event_data": { "level": "90", "usage_gb": 91.5, "cap_gb": 100.0 },
                "success": true,
                "timestamp": "2026-10-01T08:00:00Z"
            }
        ])))
        .mount(&server)
        .await;

    let events = store.recent_events(2).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].kind,
        EventKind::DeviceStatusChanged {
            previous: Reachability::Online,
            current: Reachability::Offline,
        }
    );
    assert_eq!(events[1].triggered_by, Actor::Operator("noc".into()));
    assert_eq!(events[1].kind.name(), "data_cap_warning");
}

#[tokio::test]
async fn rejected_key_is_an_authentication_error() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/equipment"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = store.list_equipment().await.unwrap_err();
    assert!(matches!(err, CoreError::StoreAuthentication { .. }));
}
