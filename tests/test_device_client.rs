//! Device client tests against a wiremock doorbell
//!
//! Exercises the digest handshake, the event stream open and the online probe.


use doorbell_bridge::config::DeviceSection;
use doorbell_bridge::device::DeviceClient;
use doorbell_bridge::observability::health::{PresenceProbe, ProbeError};
use doorbell_bridge::stream::{EventBody, EventSource, StreamError};
use std::time::Duration;
use test_helpers::device_host;
use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHALLENGE: &str =
    r#"Digest realm="Login to 4L0C1D3PAZ", qop="auth", nonce="1234567890abcdef", opaque="5ccc069c403ebaf9""#;

const STREAM_BODY: &str =
    "Heartbeat\r\nCode=AlarmLocal;action=Start;index=0\r\nCode=AlarmLocal;action=Stop;index=0\r\n";

fn section(server: &MockServer, probe_timeout_secs: u64) -> DeviceSection {
    DeviceSection {
        host: device_host(server),
        username: "admin".to_string(),
        password: "device-secret".to_string(),
        probe_timeout_secs,
    }
}

fn challenge() -> ResponseTemplate {
    ResponseTemplate::new(401).insert_header("WWW-Authenticate", CHALLENGE)
}

async fn mount_digest_stream(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/eventManager.cgi"))
        .and(query_param("action", "attach"))
        .and(query_param("codes", "[AlarmLocal]"))
        .and(header_regex("authorization", "^Digest "))
        .respond_with(ResponseTemplate::new(200).set_body_string(STREAM_BODY))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/eventManager.cgi"))
        .respond_with(challenge())
        .mount(server)
        .await;
}

async fn read_all<B: EventBody>(body: &mut B) -> Vec<u8> {
    let mut collected = Vec::new();
    while let Some(chunk) = body.next_chunk().await.unwrap() {
        collected.extend_from_slice(&chunk);
    }
    collected
}

#[tokio::test]
async fn test_open_answers_digest_challenge() {
    let server = MockServer::start().await;
    mount_digest_stream(&server).await;

    let client = DeviceClient::new(&section(&server, 2), 30).unwrap();
    let mut body = client.open().await.expect("stream should open after digest");

    assert_eq!(read_all(&mut body).await, STREAM_BODY.as_bytes());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2, "one challenge, one authenticated request");
    assert!(requests[0].headers.get("authorization").is_none());

    let authorization = requests[1]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(authorization.contains(r#"username="admin""#));
    assert!(authorization.contains(r#"realm="Login to 4L0C1D3PAZ""#));
    assert!(authorization.contains(r#"uri="/cgi-bin/eventManager.cgi?action=attach"#));
    assert!(authorization.contains("heartbeat=30"));
}

#[tokio::test]
async fn test_challenge_is_reused_on_next_open() {
    let server = MockServer::start().await;
    mount_digest_stream(&server).await;

    let client = DeviceClient::new(&section(&server, 2), 30).unwrap();
    drop(client.open().await.unwrap());
    drop(client.open().await.unwrap());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3, "second open authenticates up front");

    let nonce_count = |index: usize| {
        requests[index]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    };
    assert!(nonce_count(1).contains("nc=00000001"));
    assert!(nonce_count(2).contains("nc=00000002"));
}

#[tokio::test]
async fn test_wrong_credentials_surface_401_after_one_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/eventManager.cgi"))
        .respond_with(challenge())
        .mount(&server)
        .await;

    let client = DeviceClient::new(&section(&server, 2), 30).unwrap();
    let result = client.open().await;

    assert!(matches!(result, Err(StreamError::Status(401))));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_401_without_challenge_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/eventManager.cgi"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = DeviceClient::new(&section(&server, 2), 30).unwrap();

    assert!(matches!(client.open().await, Err(StreamError::Status(401))));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_ok_stream_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/eventManager.cgi"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = DeviceClient::new(&section(&server, 2), 30).unwrap();
    assert!(matches!(client.open().await, Err(StreamError::Status(503))));
}

#[tokio::test]
async fn test_probe_announces_online() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/configManager.cgi"))
        .and(query_param("action", "setConfig"))
        .and(query_param("VSP_PaaS.Online", "true"))
        .and(header_regex("authorization", "^Digest "))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/configManager.cgi"))
        .respond_with(challenge())
        .mount(&server)
        .await;

    let client = DeviceClient::new(&section(&server, 2), 30).unwrap();
    assert_eq!(client.announce_online().await, Ok(()));
}

#[tokio::test]
async fn test_probe_status_error_carries_status_line() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/configManager.cgi"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = DeviceClient::new(&section(&server, 2), 30).unwrap();
    assert_eq!(
        client.announce_online().await,
        Err(ProbeError::Status("500 Internal Server Error".to_string()))
    );
}

#[tokio::test]
async fn test_probe_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/configManager.cgi"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = DeviceClient::new(&section(&server, 1), 30).unwrap();
    assert!(matches!(
        client.announce_online().await,
        Err(ProbeError::Request(_))
    ));
}
