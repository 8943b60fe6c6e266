//! Reliable reconnect: subscriptions present before the drop are replayed,
//! in insertion order, on the new transport.

use std::sync::Arc;
use std::time::Duration;

use stomp_connection::{Connection, ConnectionConfig, HostSpec, NullListener, TcpTransportFactory};
use stomp_test_support::{MockBroker, MockBrokerConfig};

#[tokio::test]
async fn reconnect_replays_subscriptions_in_order() {
    // CONNECT counts as frame 1; the two SUBSCRIBEs take it to 3, at which
    // point the broker drops the socket to simulate an EOF.
    let broker = MockBroker::start(MockBrokerConfig {
        drop_after_frames: Some(3),
        ..Default::default()
    })
    .await
    .unwrap();
    let addr = broker.local_addr();

    // Both hosts point at the same broker: the point of this test is the
    // replay behavior, not host selection.
    let hosts = vec![
        HostSpec::new(addr.ip().to_string(), addr.port()),
        HostSpec::new(addr.ip().to_string(), addr.port()),
    ];
    let config = ConnectionConfig::new(hosts).reliable(true).backoff(1, 10, 2.0, true);

    let conn = Connection::connect(config, Arc::new(TcpTransportFactory), Arc::new(NullListener))
        .await
        .unwrap();

    conn.subscribe("/queue/a", Some("s1"), &[]).await.unwrap();
    conn.subscribe("/queue/b", Some("s2"), &[]).await.unwrap();

    // The broker has now closed the socket. Drive a read; it observes EOF,
    // reconnects transparently, replays subscriptions, and (since the mock
    // broker never sends a MESSAGE) the retried read simply has nothing left
    // to wait for once the replay traffic settles.
    let _ = tokio::time::timeout(Duration::from_millis(1000), conn.receive()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let frames = broker.received_frames().await;
    let subscribes: Vec<_> = frames.iter().filter(|f| f.command == "SUBSCRIBE").collect();

    assert_eq!(subscribes.len(), 4, "two originals plus two replayed");
    let replayed = &subscribes[2..];
    assert_eq!(replayed[0].header("id"), Some("s1"));
    assert_eq!(replayed[0].header("destination"), Some("/queue/a"));
    assert_eq!(replayed[1].header("id"), Some("s2"));
    assert_eq!(replayed[1].header("destination"), Some("/queue/b"));
}
