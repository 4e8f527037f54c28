//! HTTP behaviour of the control and notification client against a mock server.

use std::sync::Arc;
use std::time::Duration;

use dashboard_client::lock::{acquire_feedback, release_feedback};
use dashboard_client::{
    AddressSource, ClientIdentity, ControlApi, ControlLockClient, Endpoints, FeedbackKind,
    HttpApi, NotificationSource, ScenarioInvoker, ServerAddress,
};
use httpmock::prelude::*;
use serde_json::json;

fn api_for(server: &MockServer) -> HttpApi {
    let address = ServerAddress::parse(&server.base_url(), AddressSource::CommandLine)
        .expect("mock server address");
    let endpoints = Endpoints::new(&address).expect("endpoints");
    HttpApi::new(endpoints, Duration::from_secs(5)).expect("http client")
}

#[tokio::test]
async fn scenario_request_carries_identity_header() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/fault/scenario/overcurrent")
                .header("x-client-id", "web-abc123");
            then.status(200).json_body(json!({
                "scenario": "overcurrent",
                "result": "Motor overcurrent injected"
            }));
        })
        .await;

    let api: Arc<dyn ControlApi> = Arc::new(api_for(&server));
    let mut invoker = ScenarioInvoker::new(ClientIdentity::new("web-abc123"));
    let (pending, request) = invoker.begin("overcurrent", api).expect("idle invoker");
    assert_eq!(pending.kind, FeedbackKind::Pending);

    let outcome = invoker.settle(request.await);
    assert_eq!(outcome.kind, FeedbackKind::Success);
    assert_eq!(outcome.text, "Motor overcurrent injected");
    assert!(invoker.controls_enabled());
    assert_eq!(mock.calls_async().await, 1);
}

#[tokio::test]
async fn scenario_precondition_and_forbidden_statuses() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/fault/scenario/estop");
            then.status(423);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/fault/scenario/reset");
            then.status(403)
                .json_body(json!({"detail": "Locked by web-other01"}));
        })
        .await;

    let api: Arc<dyn ControlApi> = Arc::new(api_for(&server));
    let mut invoker = ScenarioInvoker::new(ClientIdentity::new("web-abc123"));

    let (_, request) = invoker.begin("estop", Arc::clone(&api)).expect("idle");
    let outcome = invoker.settle(request.await);
    assert_eq!(outcome.text, "Acquire the lock first");
    assert!(outcome.is_error());

    let (_, request) = invoker.begin("reset", api).expect("idle again");
    let outcome = invoker.settle(request.await);
    assert_eq!(outcome.text, "Locked by web-other01");
}

#[tokio::test]
async fn acquire_conflict_surfaces_reason_without_touching_display() {
    let server = MockServer::start_async().await;
    let acquire = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/fault/control/acquire")
                .json_body(json!({"client_id": "web-xyz999"}));
            then.status(409)
                .json_body(json!({"detail": "held by web-abc123"}));
        })
        .await;

    let api: Arc<dyn ControlApi> = Arc::new(api_for(&server));
    let lock = ControlLockClient::new(ClientIdentity::new("web-xyz999"));
    let before = lock.view().clone();

    let feedback = lock.acquire(api).await;
    assert_eq!(feedback.text, "held by web-abc123");
    assert!(feedback.is_error());
    assert_eq!(lock.view(), &before);
    assert_eq!(acquire.calls_async().await, 1);
}

#[tokio::test]
async fn acquire_and_release_success_bodies() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/fault/control/acquire");
            then.status(200).json_body(json!({
                "locked": true,
                "client_id": "web-abc123",
                "remaining_sec": 300
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/fault/control/release");
            then.status(200).json_body(json!({"locked": false}));
        })
        .await;

    let api = api_for(&server);
    let me = ClientIdentity::new("web-abc123");
    assert_eq!(
        acquire_feedback(api.acquire_lock(&me).await).text,
        "Lock acquired (300s)"
    );
    assert_eq!(
        release_feedback(api.release_lock(&me).await).text,
        "Lock released"
    );
}

#[tokio::test]
async fn lock_status_and_scenario_catalogue() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/fault/control/status");
            then.status(200).json_body(json!({
                "locked": true,
                "client_id": "web-abc123",
                "remaining_sec": 12.5
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/fault/scenarios");
            then.status(200).json_body(json!({
                "scenarios": {
                    "normal_drive": "Normal driving",
                    "estop": "Emergency stop"
                }
            }));
        })
        .await;

    let api = api_for(&server);
    let status = api.lock_status().await.expect("lock status");
    assert!(status.locked);
    assert_eq!(status.client_id, "web-abc123");

    let names: Vec<String> = api
        .list_scenarios()
        .await
        .expect("catalogue")
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["estop".to_string(), "normal_drive".to_string()]);
}

#[tokio::test]
async fn notification_query_unwraps_envelope() {
    let server = MockServer::start_async().await;
    let query = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/sap/opu/odata/sap/API_QUALITYNOTIFICATION/QualityNotification")
                .query_param("$top", "20")
                .query_param("$orderby", "created_at desc");
            then.status(200).json_body(json!({
                "d": {
                    "results": [
                        {"notification_id": "QN-00002", "dtc_code": "P0A1F", "status": "OSNO"},
                        {"notification_id": "QN-00001", "dtc_code": "C0051", "priority": "1"}
                    ]
                }
            }));
        })
        .await;

    let api = api_for(&server);
    let records = api.query_notifications(20).await.expect("notifications");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].notification_id, "QN-00002");
    assert_eq!(records[1].priority.as_deref(), Some("1"));
    assert_eq!(query.calls_async().await, 1);
}

#[tokio::test]
async fn notification_query_failure_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/sap/opu/odata/sap/API_QUALITYNOTIFICATION/QualityNotification");
            then.status(503);
        })
        .await;

    let api = api_for(&server);
    assert!(api.query_notifications(20).await.is_err());
}

#[tokio::test]
async fn unreachable_server_maps_to_network_error() {
    // Nothing listens on port 9 on loopback.
    let address = ServerAddress::parse("http://127.0.0.1:9", AddressSource::CommandLine)
        .expect("address");
    let api: Arc<dyn ControlApi> = Arc::new(
        HttpApi::new(Endpoints::new(&address).expect("endpoints"), Duration::from_secs(2))
            .expect("client"),
    );
    let lock = ControlLockClient::new(ClientIdentity::new("web-abc123"));
    assert_eq!(lock.release(api).await.text, "Network error");
}
