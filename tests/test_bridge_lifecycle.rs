//! End-to-end bridge lifecycle
//!
//! Runs the whole bridge against a fake doorbell and an in-process MQTT
//! broker: a doorbell press on the event stream must come out as a publish on
//! `doorbell/pressed`, and shutdown must walk every phase and drop both links.


use doorbell_bridge::{Bridge, BridgePhase};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{device_host, test_config, FakeBroker, FakeDoorbell};
use tokio::sync::oneshot;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRESS: &str = "Heartbeat\r\nCode=AlarmLocal;action=Start;index=0\r\n";

async fn doorbell() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/eventManager.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PRESS))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/configManager.cgi"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_press_is_published_and_shutdown_is_orderly() {
    let doorbell = doorbell().await;
    let mut broker = FakeBroker::start().await;

    let bridge = Arc::new(Bridge::new(test_config(
        &device_host(&doorbell),
        broker.addr,
    )));
    let mut phases = bridge.subscribe_phase();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let runner = bridge.clone();
    let task = tokio::spawn(async move {
        runner
            .run(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    timeout(
        Duration::from_secs(10),
        phases.wait_for(|phase| *phase == BridgePhase::Running),
    )
    .await
    .expect("bridge should reach Running")
    .unwrap();
    assert!(bridge.flags().bus_connected());

    let published = timeout(Duration::from_secs(10), broker.wait_for(b"doorbell/pressed"))
        .await
        .expect("press should be published");
    assert!(published);

    shutdown_tx.send(()).unwrap();
    let summary = timeout(Duration::from_secs(10), task)
        .await
        .expect("shutdown should finish within the grace periods")
        .unwrap()
        .expect("bridge run should succeed");

    assert!(summary.iterations >= 1);
    assert!(summary.events_detected >= 1);
    assert_eq!(bridge.phase(), BridgePhase::Stopped);

    let snapshot = bridge.flags().snapshot();
    assert!(!snapshot.bus_connected);
    assert!(!snapshot.stream_connected);
}

#[tokio::test]
async fn test_open_stream_reports_healthy() {
    let doorbell = FakeDoorbell::start(PRESS).await;
    let mut broker = FakeBroker::start().await;

    let bridge = Arc::new(Bridge::new(test_config(&doorbell.host(), broker.addr)));
    assert!(!bridge.flags().stream_connected());

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let runner = bridge.clone();
    let task = tokio::spawn(async move {
        runner
            .run(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    // The press is only read once the stream is open
    let published = timeout(Duration::from_secs(10), broker.wait_for(b"doorbell/pressed"))
        .await
        .expect("press should be published");
    assert!(published);
    assert!(bridge.flags().stream_connected());

    let health_port = bridge.health_addr().expect("health server bound").port();
    let response = reqwest::get(format!("http://127.0.0.1:{health_port}/health"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "");

    // The supervisor is still blocked on the open stream and gets aborted
    shutdown_tx.send(()).unwrap();
    let result = timeout(Duration::from_secs(10), task)
        .await
        .expect("shutdown should finish within the grace periods")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(bridge.phase(), BridgePhase::Stopped);

    let snapshot = bridge.flags().snapshot();
    assert!(!snapshot.bus_connected);
    assert!(!snapshot.stream_connected);
}

#[tokio::test]
async fn test_health_port_conflict_is_fatal() {
    let doorbell = doorbell().await;
    let broker = FakeBroker::start().await;

    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let mut config = test_config(&device_host(&doorbell), broker.addr);
    config.health.port = taken.local_addr().unwrap().port();

    let bridge = Bridge::new(config);
    let result = bridge.run(std::future::pending::<()>()).await;

    assert!(matches!(
        result,
        Err(doorbell_bridge::BridgeError::HealthServer(_))
    ));
    assert_eq!(bridge.phase(), BridgePhase::Stopped);
    assert!(!bridge.flags().bus_connected(), "gateway is torn down again");
}
