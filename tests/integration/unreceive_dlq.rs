//! Redelivery exhaustion sends the message to the dead-letter queue inside a
//! single committed transaction, and the original destination receives
//! nothing.

use std::sync::Arc;
use std::time::Duration;

use stomp_connection::{unreceive, Connection, ConnectionConfig, Frame, HostSpec, NullListener, TcpTransportFactory, UnreceiveOptions};
use stomp_test_support::{MockBroker, MockBrokerConfig};

#[tokio::test]
async fn exhausted_redeliveries_go_to_dead_letter_queue() {
    let broker = MockBroker::start(MockBrokerConfig::default()).await.unwrap();
    let addr = broker.local_addr();

    let config = ConnectionConfig::new(vec![HostSpec::new(addr.ip().to_string(), addr.port())]);
    let conn = Connection::connect(config, Arc::new(TcpTransportFactory), Arc::new(NullListener))
        .await
        .unwrap();

    let message = Frame::new("MESSAGE")
        .with_header("message-id", "m-9")
        .unwrap()
        .with_header("destination", "/queue/x")
        .unwrap()
        .with_header("retry_count", "6")
        .unwrap()
        .with_body(b"poison".to_vec());

    let options = UnreceiveOptions {
        dead_letter_queue: "/queue/DLQ".to_owned(),
        max_redeliveries: 6,
        force_client_ack: true,
    };

    unreceive(&conn, &message, &options).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let frames = broker.received_frames().await;
    let commands: Vec<&str> = frames.iter().map(|f| f.command.as_str()).collect();
    assert_eq!(commands, vec!["BEGIN", "ACK", "SEND", "COMMIT"]);

    let transaction = "transaction-m-9-6";
    assert_eq!(frames[0].header("transaction"), Some(transaction));
    assert_eq!(frames[1].header("id"), Some("m-9"));
    assert_eq!(frames[1].header("transaction"), Some(transaction));

    let send = &frames[2];
    assert_eq!(send.header("destination"), Some("/queue/DLQ"));
    assert_eq!(send.header("original_destination"), Some("/queue/x"));
    assert_eq!(send.header("persistent"), Some("true"));
    assert_eq!(send.header("transaction"), Some(transaction));
    assert_eq!(send.body, b"poison");

    assert_eq!(frames[3].header("transaction"), Some(transaction));

    let destination_x_sends = frames
        .iter()
        .filter(|f| f.command == "SEND" && f.header("destination") == Some("/queue/x"))
        .count();
    assert_eq!(destination_x_sends, 0);
}
