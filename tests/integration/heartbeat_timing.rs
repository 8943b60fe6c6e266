//! Negotiated send heartbeat fires a bare LINE-END byte on schedule when no
//! user frames are in flight.

use std::sync::Arc;
use std::time::Duration;

use stomp_connection::{Connection, ConnectionConfig, HostSpec, NullListener, TcpTransportFactory};
use stomp_test_support::{MockBroker, MockBrokerConfig};

#[tokio::test]
async fn sender_emits_heartbeats_at_negotiated_interval() {
    let broker = MockBroker::start(MockBrokerConfig {
        connected_heartbeat: Some((150, 150)),
        ..Default::default()
    })
    .await
    .unwrap();
    let addr = broker.local_addr();

    let config = ConnectionConfig::new(vec![HostSpec::new(addr.ip().to_string(), addr.port())])
        .heartbeat(150, 150);
    let conn = Connection::connect(config, Arc::new(TcpTransportFactory), Arc::new(NullListener))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;

    let snapshot = conn.snapshot().await;
    assert!(
        snapshot.hbsend_count >= 3,
        "expected several heartbeats over 700ms at a 150ms interval, got {}",
        snapshot.hbsend_count
    );
    assert!(snapshot.hb_sent);
}
