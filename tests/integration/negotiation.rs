//! CONNECT negotiation and per-version ACK/NACK header shape.

use std::sync::Arc;
use std::time::Duration;

use stomp_connection::{Connection, ConnectionConfig, ConnectionError, HostSpec, NullListener, TcpTransportFactory};
use stomp_protocol::StompVersion;
use stomp_test_support::{MockBroker, MockBrokerConfig};

fn host_for(broker: &MockBroker) -> HostSpec {
    let addr = broker.local_addr();
    HostSpec::new(addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn connect_negotiates_1_2_and_heartbeat_intervals() {
    let broker = MockBroker::start(MockBrokerConfig {
        connected_version: StompVersion::V1_2,
        connected_session: Some("S-1".to_owned()),
        connected_heartbeat: Some((0, 20_000)),
        ..Default::default()
    })
    .await
    .unwrap();

    let config = ConnectionConfig::new(vec![host_for(&broker)])
        .heartbeat(10_000, 10_000)
        .connect_header("login", "u")
        .connect_header("passcode", "p");

    let conn = Connection::connect(config, Arc::new(TcpTransportFactory), Arc::new(NullListener))
        .await
        .unwrap();

    let snapshot = conn.snapshot().await;
    assert_eq!(snapshot.protocol, StompVersion::V1_2);
    assert_eq!(snapshot.session.as_deref(), Some("S-1"));
}

#[tokio::test]
async fn ack_under_1_2_sends_bare_id_header() {
    let broker = MockBroker::start(MockBrokerConfig {
        connected_version: StompVersion::V1_2,
        ..Default::default()
    })
    .await
    .unwrap();

    let config = ConnectionConfig::new(vec![host_for(&broker)]);
    let conn = Connection::connect(config, Arc::new(TcpTransportFactory), Arc::new(NullListener))
        .await
        .unwrap();

    conn.ack("a-7", &[]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let frames = broker.received_frames().await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, "ACK");
    assert_eq!(frames[0].header("id"), Some("a-7"));
    assert_eq!(frames[0].header("message-id"), None);
}

#[tokio::test]
async fn ack_under_1_1_without_subscription_header_fails_before_any_write() {
    let broker = MockBroker::start(MockBrokerConfig {
        connected_version: StompVersion::V1_1,
        ..Default::default()
    })
    .await
    .unwrap();

    let config = ConnectionConfig::new(vec![host_for(&broker)]);
    let conn = Connection::connect(config, Arc::new(TcpTransportFactory), Arc::new(NullListener))
        .await
        .unwrap();

    let err = conn.ack("m-3", &[]).await.unwrap_err();
    assert!(matches!(err, ConnectionError::SubscriptionRequired));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(broker.received_frames().await.is_empty());
}
