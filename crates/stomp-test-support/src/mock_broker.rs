//! A mock STOMP broker for integration testing.
//!
//! Binds to port 0 (random) and exposes the actual bound port. Accepts raw
//! TCP connections, speaks the STOMP wire protocol via `stomp-protocol`'s
//! codec, replies to CONNECT/STOMP with a configurable CONNECTED frame, and
//! records every other frame it receives for test assertions.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder};

use stomp_protocol::codec::{OutboundItem, WireEvent};
use stomp_protocol::{Frame, StompCodec, StompVersion};

/// Broker-side behavior a test wants to exercise.
#[derive(Debug, Clone)]
pub struct MockBrokerConfig {
    pub connected_version: StompVersion,
    pub connected_session: Option<String>,
    /// (sx, sy) heart-beat header value the broker advertises in CONNECTED.
    pub connected_heartbeat: Option<(u64, u64)>,
    pub use_crlf: bool,
    /// Close the socket after this many frames have been received from the
    /// client (CONNECT/STOMP counts as frame 1), to simulate a broker-side
    /// drop mid-session for reconnect tests. `None` never drops.
    pub drop_after_frames: Option<usize>,
}

impl Default for MockBrokerConfig {
    fn default() -> Self {
        MockBrokerConfig {
            connected_version: StompVersion::V1_2,
            connected_session: Some("S-1".to_owned()),
            connected_heartbeat: None,
            use_crlf: false,
            drop_after_frames: None,
        }
    }
}

/// A running mock broker instance.
///
/// Binds a random available port. Each test can spin up its own isolated
/// instance; dropping it stops the accept loop.
pub struct MockBroker {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Frame>>>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockBroker {
    pub async fn start(config: MockBrokerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_for_task = received.clone();

        let task = tokio::spawn(async move {
            Self::accept_loop(listener, config, received_for_task).await;
        });

        Ok(MockBroker {
            addr,
            received,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Snapshot of every non-CONNECT frame received so far, in arrival order.
    pub async fn received_frames(&self) -> Vec<Frame> {
        self.received.lock().await.clone()
    }

    async fn accept_loop(
        listener: TcpListener,
        config: MockBrokerConfig,
        received: Arc<Mutex<Vec<Frame>>>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let config = config.clone();
                    let received = received.clone();
                    tokio::spawn(async move {
                        let _ = Self::handle_connection(stream, config, received).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        config: MockBrokerConfig,
        received: Arc<Mutex<Vec<Frame>>>,
    ) -> std::io::Result<()> {
        let mut codec = StompCodec::new(config.connected_version, config.use_crlf);
        let mut buf = BytesMut::with_capacity(4096);
        let mut frame_count = 0usize;

        loop {
            loop {
                match codec.decode(&mut buf) {
                    Ok(Some(WireEvent::Frame(frame))) => {
                        frame_count += 1;
                        if frame.command == "CONNECT" || frame.command == "STOMP" {
                            let mut connected = Frame::new("CONNECTED")
                                .with_header("version", config.connected_version.as_header_value())
                                .expect("well-formed static header");
                            if let Some(session) = &config.connected_session {
                                connected = connected
                                    .with_header("session", session.clone())
                                    .expect("well-formed static header");
                            }
                            if let Some((sx, sy)) = config.connected_heartbeat {
                                connected = connected
                                    .with_header("heart-beat", format!("{sx},{sy}"))
                                    .expect("well-formed static header");
                            }
                            let mut out = BytesMut::new();
                            codec
                                .encode(OutboundItem::Frame(connected), &mut out)
                                .expect("encoding a well-formed CONNECTED frame cannot fail");
                            stream.write_all(&out).await?;
                        } else {
                            received.lock().await.push(frame);
                        }
                    }
                    Ok(Some(WireEvent::HeartBeat)) => {
                        let mut out = BytesMut::new();
                        codec
                            .encode(OutboundItem::HeartBeat, &mut out)
                            .expect("encoding a heartbeat byte cannot fail");
                        stream.write_all(&out).await?;
                    }
                    Ok(None) => break,
                    Err(_) => return Ok(()),
                }

                if let Some(limit) = config.drop_after_frames {
                    if frame_count >= limit {
                        return Ok(());
                    }
                }
            }

            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Connect a plain TCP stream to a mock broker's address; test helper for
/// tests that want to drive the raw socket directly rather than through a
/// full connection.
pub async fn connect_raw(broker: &MockBroker) -> std::io::Result<TcpStream> {
    TcpStream::connect(broker.local_addr()).await
}
