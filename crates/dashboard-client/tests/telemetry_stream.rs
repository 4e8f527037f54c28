//! End-to-end telemetry stream over a loopback WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use dashboard_client::{
    ClientIdentity, ConnectionState, ConnectionSupervisor, ReconnectConfig, SupervisorUpdate,
    TelemetryReconciler, WsConnector,
};
use futures::SinkExt;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const FIRST_WINDOW: &str = r#"{
    "stats": {"uptime_sec": 5, "can_msgs_sec": 120},
    "control": {"locked": true, "client_id": "web-abc123", "remaining_sec": 45},
    "events": [
        {"ts": 100.0, "type": "state", "msg": "INIT -> RUN"},
        {"ts": 101.0, "type": "fault", "msg": "Overcurrent"}
    ]
}"#;

const SECOND_WINDOW: &str = r#"{
    "events": [
        {"ts": 101.0, "type": "fault", "msg": "Overcurrent"},
        {"ts": 102.0, "type": "dtc", "msg": "DTC P0A1F"}
    ]
}"#;

/// Serves each accepted connection the given frames, then closes it.
async fn spawn_bridge(frames: Vec<&'static str>, connections: usize) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        for _ in 0..connections {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(tcp).await.expect("handshake");
            for frame in &frames {
                ws.send(Message::text(*frame)).await.expect("send");
            }
            let _ = ws.close(None).await;
        }
    });
    Url::parse(&format!("ws://{addr}/ws/telemetry")).expect("url")
}

fn fast_config() -> ReconnectConfig {
    ReconnectConfig {
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn frames_flow_through_reconciler_and_survive_reconnect() {
    // The bridge replays an overlapping window on each connection.
    let url = spawn_bridge(vec![FIRST_WINDOW, "not json", SECOND_WINDOW], 2).await;
    let mut supervisor = ConnectionSupervisor::new(url, fast_config(), Arc::new(WsConnector));
    let mut view = TelemetryReconciler::new(ClientIdentity::new("web-abc123"), 200);
    supervisor.start();

    let mut connects = 0;
    let mut snapshots = 0;
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        while connects < 2 || snapshots < 4 {
            match supervisor.next_update().await.expect("supervisor channel") {
                SupervisorUpdate::Status(ConnectionState::Connected) => connects += 1,
                SupervisorUpdate::Status(_) => {}
                SupervisorUpdate::Snapshot(snapshot) => {
                    snapshots += 1;
                    view.reconcile(&snapshot);
                }
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for two connections");

    let messages: Vec<&str> = view.events.entries().map(|e| e.msg.as_str()).collect();
    assert_eq!(messages, vec!["INIT -> RUN", "Overcurrent", "DTC P0A1F"]);
    assert!((view.events.watermark() - 102.0).abs() < f64::EPSILON);
    assert_eq!(view.lock.view().to_string(), "You have control, 45s remaining");
    assert_eq!(view.stats.as_ref().map(|s| s.rate.as_str()), Some("120 msg/s"));
}

#[tokio::test]
async fn refused_connection_reports_reconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let url = Url::parse(&format!("ws://{addr}/ws/telemetry")).expect("url");
    let mut supervisor = ConnectionSupervisor::new(url, fast_config(), Arc::new(WsConnector));
    supervisor.start();

    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.len() < 3 {
            if let Some(SupervisorUpdate::Status(state)) = supervisor.next_update().await {
                seen.push(state);
            }
        }
    })
    .await
    .expect("status updates");

    assert_eq!(seen[0], ConnectionState::Connecting);
    assert_eq!(seen[1], ConnectionState::Disconnected);
    assert!(matches!(seen[2], ConnectionState::Reconnecting { attempt: 1, .. }));
}
