//! The public connection core: mediates the three-lock discipline, drives
//! protocol negotiation, and owns the reconnect loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use indexmap::IndexMap;
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use stomp_protocol::codec::{OutboundItem, WireEvent};
use stomp_protocol::{Frame, StompCodec, StompVersion};

use crate::config::{ConnectionConfig, HostSpec};
use crate::error::ConnectionError;
use crate::heartbeat::{HeartbeatMonitorSink, HeartbeatSink, HeartbeatState, HeartbeatTasks};
use crate::hosts::HostPool;
use crate::listener::{ConnectionListener, NullListener};
use crate::session::{self, SessionState, Subscription};
use crate::transport::{Transport, TransportFactory};

type BoxedTransport = Box<dyn Transport>;

struct WriteSide {
    half: Option<WriteHalf<BoxedTransport>>,
    codec: StompCodec,
}

struct ReadSide {
    half: Option<ReadHalf<BoxedTransport>>,
    buf: BytesMut,
    codec: StompCodec,
}

/// A connection snapshot for callers that want to inspect state without
/// driving their own reads.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub protocol: StompVersion,
    pub session: Option<String>,
    pub hb_received: bool,
    pub hb_sent: bool,
    pub hbsend_count: u64,
    pub hbrecv_count: u64,
    pub connection_attempts: u32,
}

struct Inner {
    config: ConnectionConfig,
    factory: Arc<dyn TransportFactory>,
    listener: Arc<dyn ConnectionListener>,
    hosts: Mutex<HostPool>,
    socket: Mutex<()>,
    write: Mutex<WriteSide>,
    read: Mutex<ReadSide>,
    session: Mutex<SessionState>,
    heartbeat_state: Arc<HeartbeatState>,
    heartbeat_tasks: Mutex<Option<HeartbeatTasks>>,
    closed: AtomicBool,
    reconnect_attempts: AtomicU32,
}

/// The stateful, long-lived STOMP client connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct ConnHeartbeatSink(Arc<Inner>);

#[async_trait]
impl HeartbeatSink for ConnHeartbeatSink {
    async fn send_heartbeat_byte(&self) -> std::io::Result<()> {
        write_raw(&self.0, OutboundItem::HeartBeat)
            .await
            .map_err(to_io_error)
    }
}

struct ConnMonitorSink(Arc<Inner>);

#[async_trait]
impl HeartbeatMonitorSink for ConnMonitorSink {
    async fn on_recv_timeout(&self) {
        self.0.listener.on_heartbeat_timeout();
        if self.0.config.reliable {
            let inner = self.0.clone();
            tokio::spawn(async move {
                let conn = Connection { inner };
                if let Err(e) = conn.reconnect().await {
                    warn!(error = %e, "reconnect after heartbeat lapse failed");
                }
            });
        } else {
            self.0.heartbeat_state.mark_recv_failure();
        }
    }
}

fn to_io_error(e: ConnectionError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

impl Connection {
    /// Open the connection: pick the first host, connect, negotiate, and
    /// start heartbeat timers if applicable.
    pub async fn connect(
        config: ConnectionConfig,
        factory: Arc<dyn TransportFactory>,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<Self, ConnectionError> {
        let hosts = HostPool::new(&config);
        let inner = Arc::new(Inner {
            config,
            factory,
            listener,
            hosts: Mutex::new(hosts),
            socket: Mutex::new(()),
            write: Mutex::new(WriteSide {
                half: None,
                codec: StompCodec::default(),
            }),
            read: Mutex::new(ReadSide {
                half: None,
                buf: BytesMut::new(),
                codec: StompCodec::default(),
            }),
            session: Mutex::new(SessionState::default()),
            heartbeat_state: HeartbeatState::new(),
            heartbeat_tasks: Mutex::new(None),
            closed: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
        });
        let conn = Connection { inner };
        let host = conn.inner.hosts.lock().await.current().clone();
        conn.open_and_handshake(&host).await?;
        Ok(conn)
    }

    pub fn listener(&self) -> Arc<dyn ConnectionListener> {
        self.inner.listener.clone()
    }

    pub async fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let session = self.inner.session.lock().await;
        ConnectionSnapshot {
            protocol: session.protocol,
            session: session.session_id.clone(),
            hb_received: self.inner.heartbeat_state.hb_received.load(Ordering::Relaxed),
            hb_sent: self.inner.heartbeat_state.hb_sent.load(Ordering::Relaxed),
            hbsend_count: self.inner.heartbeat_state.send_count.load(Ordering::Relaxed),
            hbrecv_count: self.inner.heartbeat_state.recv_count.load(Ordering::Relaxed),
            connection_attempts: self.inner.reconnect_attempts.load(Ordering::Relaxed),
        }
    }

    // -- public operations -------------------------------------------------

    pub async fn subscribe(
        &self,
        destination: &str,
        id: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<String, ConnectionError> {
        self.check_open()?;
        let protocol = self.inner.session.lock().await.protocol;
        let header_id = headers.iter().find(|(k, _)| k == "id").map(|(_, v)| v.clone());
        let resolved_id = id.map(str::to_owned).or(header_id);
        let resolved_id = if protocol.requires_subscription_id() {
            resolved_id.ok_or(ConnectionError::SubscriptionRequired)?
        } else {
            resolved_id.unwrap_or_default()
        };

        if self.inner.config.reliable {
            let session = self.inner.session.lock().await;
            if session.subscriptions.contains_key(&resolved_id) {
                return Err(ConnectionError::DuplicateSubscription(resolved_id));
            }
        }

        let mut frame = Frame::new("SUBSCRIBE").with_header("destination", destination)?;
        if !resolved_id.is_empty() {
            frame = frame.with_header("id", resolved_id.clone())?;
        }
        let mut stored_headers = IndexMap::new();
        stored_headers.insert("destination".to_owned(), destination.to_owned());
        for (key, value) in headers {
            if key == "id" || key == "destination" {
                continue;
            }
            frame = frame.with_header(key.clone(), value.clone())?;
            stored_headers.insert(key.clone(), value.clone());
        }
        if !resolved_id.is_empty() {
            stored_headers.insert("id".to_owned(), resolved_id.clone());
        }

        self.inner.listener.on_subscribe(&resolved_id, headers);
        self.transmit_frame(frame).await?;

        let mut session = self.inner.session.lock().await;
        session.subscriptions.insert(
            resolved_id.clone(),
            Subscription {
                id: resolved_id.clone(),
                headers: stored_headers,
            },
        );
        Ok(resolved_id)
    }

    pub async fn unsubscribe(&self, id: &str) -> Result<(), ConnectionError> {
        self.check_open()?;
        let frame = Frame::new("UNSUBSCRIBE").with_header("id", id)?;
        self.inner.listener.on_unsubscribe(id);
        self.transmit_frame(frame).await?;
        self.inner.session.lock().await.subscriptions.shift_remove(id);
        Ok(())
    }

    pub async fn send_message(
        &self,
        destination: &str,
        body: Vec<u8>,
        headers: &[(String, String)],
        suppress_content_length: bool,
    ) -> Result<(), ConnectionError> {
        self.check_open()?;
        let mut frame = Frame::new("SEND").with_header("destination", destination)?;
        for (key, value) in headers {
            if key == "destination" || key == "content-length" {
                continue;
            }
            frame = frame.with_header(key.clone(), value.clone())?;
        }
        if !suppress_content_length {
            frame = frame.with_header("content-length", body.len().to_string())?;
        }
        frame.body = body;
        self.inner.listener.on_publish(&frame);
        self.transmit_frame(frame).await
    }

    pub async fn ack(&self, id: &str, headers: &[(String, String)]) -> Result<(), ConnectionError> {
        self.ack_or_nack("ACK", id, headers).await
    }

    pub async fn nack(&self, id: &str, headers: &[(String, String)]) -> Result<(), ConnectionError> {
        let protocol = self.inner.session.lock().await.protocol;
        if !protocol.supports_nack() {
            return Err(ConnectionError::UnsupportedProtocol(protocol));
        }
        self.ack_or_nack("NACK", id, headers).await
    }

    async fn ack_or_nack(
        &self,
        command: &'static str,
        id: &str,
        headers: &[(String, String)],
    ) -> Result<(), ConnectionError> {
        self.check_open()?;
        let protocol = self.inner.session.lock().await.protocol;
        let mut frame = Frame::new(command);
        match protocol {
            StompVersion::V1_0 => {
                frame = frame.with_header("message-id", id)?;
            }
            StompVersion::V1_1 => {
                let subscription = headers
                    .iter()
                    .find(|(k, _)| k == "subscription")
                    .map(|(_, v)| v.clone())
                    .ok_or(ConnectionError::SubscriptionRequired)?;
                frame = frame
                    .with_header("message-id", id)?
                    .with_header("subscription", subscription)?;
            }
            StompVersion::V1_2 => {
                frame = frame.with_header("id", id)?;
            }
        }
        for (key, value) in headers {
            if key == "subscription" || key == "message-id" || key == "id" {
                continue;
            }
            frame = frame.with_header(key.clone(), value.clone())?;
        }
        self.transmit_frame(frame).await
    }

    pub async fn begin(&self, transaction: &str) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.transmit_frame(Frame::new("BEGIN").with_header("transaction", transaction)?)
            .await
    }

    pub async fn commit(&self, transaction: &str) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.transmit_frame(Frame::new("COMMIT").with_header("transaction", transaction)?)
            .await
    }

    pub async fn abort(&self, transaction: &str) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.transmit_frame(Frame::new("ABORT").with_header("transaction", transaction)?)
            .await
    }

    pub async fn disconnect(&self, receipt: Option<&str>) -> Result<Option<Frame>, ConnectionError> {
        self.check_open()?;
        if let Some(tasks) = self.inner.heartbeat_tasks.lock().await.take() {
            tasks.stop().await;
        }

        // Set before the socket lock is taken so a reconnect loop already in
        // flight (spawned off a heartbeat lapse) observes it and bails out
        // instead of racing this teardown to reopen the transport.
        self.inner.closed.store(true, Ordering::SeqCst);

        let mut frame = Frame::new("DISCONNECT");
        if let Some(r) = receipt {
            frame = frame.with_header("receipt", r)?;
        }
        self.transmit_frame(frame).await?;

        let receipt_frame = if receipt.is_some() {
            Some(self.read_one_frame().await?)
        } else {
            None
        };

        {
            let _socket_guard = self.inner.socket.lock().await;
            let mut write = self.inner.write.lock().await;
            write.half = None;
            let mut read = self.inner.read.lock().await;
            read.half = None;
            read.buf.clear();
        }
        {
            let mut session = self.inner.session.lock().await;
            session.closed = true;
            session.disconnect_receipt = receipt_frame.clone();
        }
        self.inner.listener.on_disconnect();
        Ok(receipt_frame)
    }

    /// Read one frame, blocking until it arrives. On EOF in reliable mode,
    /// reconnects and retries the read exactly once.
    pub async fn receive(&self) -> Result<Frame, ConnectionError> {
        self.check_open()?;
        if self.inner.heartbeat_state.take_recv_failure() {
            return Err(ConnectionError::HeartbeatRecv);
        }
        match self.read_one_frame().await {
            Ok(frame) => Ok(frame),
            Err(ConnectionError::ConnectionClosed) if self.inner.config.reliable && !self.closed().await => {
                warn!("EOF on read, reconnecting transparently");
                self.reconnect().await?;
                self.read_one_frame().await
            }
            Err(e) => Err(e),
        }
    }

    /// Non-blocking variant: returns `Ok(None)` if no frame is readable yet.
    pub async fn poll(&self) -> Result<Option<Frame>, ConnectionError> {
        match tokio::time::timeout(Duration::from_millis(0), self.receive()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    // -- internals -----------------------------------------------------------

    fn check_open(&self) -> Result<(), ConnectionError> {
        if self.inner.config.closed_check && self.inner.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::NoCurrentConnection);
        }
        Ok(())
    }

    async fn transmit_frame(&self, frame: Frame) -> Result<(), ConnectionError> {
        if let Some(message) = self.inner.heartbeat_state.take_send_failure().await {
            return Err(ConnectionError::HeartbeatSend(message));
        }
        match write_raw(&self.inner, OutboundItem::Frame(frame)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.listener.on_error(&e);
                if self.inner.config.reliable {
                    self.reconnect().await?;
                    Err(ConnectionError::RetryPending)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Read one frame, bounding the time to assemble it once its first byte
    /// has arrived by `config.parse_timeout_ms` (0 disables the bound).
    async fn read_one_frame(&self) -> Result<Frame, ConnectionError> {
        let mut read = self.inner.read.lock().await;
        let parse_timeout = if self.inner.config.parse_timeout_ms > 0 {
            Some(Duration::from_millis(self.inner.config.parse_timeout_ms))
        } else {
            None
        };
        let mut deadline = if read.buf.is_empty() {
            None
        } else {
            parse_timeout.map(|t| tokio::time::Instant::now() + t)
        };
        loop {
            match read.codec.decode(&mut read.buf)? {
                Some(WireEvent::Frame(frame)) => {
                    self.inner.heartbeat_state.note_read().await;
                    if frame.command == "MESSAGE" {
                        self.inner.listener.on_message(&frame);
                    }
                    return Ok(frame);
                }
                Some(WireEvent::HeartBeat) => {
                    self.inner.heartbeat_state.note_read().await;
                    deadline = None;
                    continue;
                }
                None => {
                    let Some(half) = read.half.as_mut() else {
                        return Err(ConnectionError::ConnectionClosed);
                    };
                    let mut chunk = [0u8; 4096];
                    let n = match deadline {
                        Some(deadline) => tokio::time::timeout_at(deadline, half.read(&mut chunk))
                            .await
                            .map_err(|_| ConnectionError::ParseTimeout)??,
                        None => half.read(&mut chunk).await?,
                    };
                    if n == 0 {
                        return Err(ConnectionError::ConnectionClosed);
                    }
                    if deadline.is_none() {
                        deadline = parse_timeout.map(|t| tokio::time::Instant::now() + t);
                    }
                    read.buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    async fn open_and_handshake(&self, host: &HostSpec) -> Result<(), ConnectionError> {
        let connect_timeout = if self.inner.config.connect_timeout_ms > 0 {
            Some(Duration::from_millis(self.inner.config.connect_timeout_ms))
        } else {
            None
        };
        let transport = self.inner.factory.connect(host, connect_timeout).await?;
        let (read_half, write_half) = split(transport);

        {
            let mut write = self.inner.write.lock().await;
            write.half = Some(write_half);
            write.codec = StompCodec::new(StompVersion::V1_0, self.inner.config.usecrlf);
        }
        {
            let mut read = self.inner.read.lock().await;
            read.half = Some(read_half);
            read.buf.clear();
            read.codec = StompCodec::new(StompVersion::V1_0, self.inner.config.usecrlf);
        }

        let mut connect_headers = self.inner.config.connect_headers.clone();
        if self.inner.config.dmh {
            connect_headers.push(("dmh".to_owned(), "true".to_owned()));
        }
        let connect_frame = session::build_connect_frame(
            host,
            self.inner.config.stompconn,
            &stomp_protocol::version::ALL_VERSIONS,
            self.inner.config.heartbeat,
            &connect_headers,
        )?;
        write_raw(&self.inner, OutboundItem::Frame(connect_frame)).await?;

        let reply = self.read_one_frame().await?;
        let new_session = session::parse_connected(reply)?;
        let negotiated_send = new_session.negotiated_send_interval_ms(self.inner.config.heartbeat.0);
        let negotiated_recv = new_session.negotiated_recv_interval_ms(self.inner.config.heartbeat.1);

        {
            let mut write = self.inner.write.lock().await;
            write.codec.set_version(new_session.protocol);
        }
        {
            let mut read = self.inner.read.lock().await;
            read.codec.set_version(new_session.protocol);
        }
        self.inner
            .listener
            .on_connect(new_session.connect_frame.as_ref().expect("set by parse_connected"));
        {
            let mut session = self.inner.session.lock().await;
            let subscriptions = std::mem::take(&mut session.subscriptions);
            *session = new_session;
            session.subscriptions = subscriptions;
        }

        if let Some(tasks) = self.inner.heartbeat_tasks.lock().await.take() {
            tasks.stop().await;
        }
        if self.inner.session.lock().await.protocol.supports_heartbeat() && (negotiated_send > 0 || negotiated_recv > 0) {
            let sink = Arc::new(ConnHeartbeatSink(self.inner.clone()));
            let monitor_sink = Arc::new(ConnMonitorSink(self.inner.clone()));
            let tasks = HeartbeatTasks::start(
                self.inner.heartbeat_state.clone(),
                negotiated_send,
                negotiated_recv,
                self.inner.config.heartbeat_tolerance,
                self.inner.config.hbser,
                sink,
                monitor_sink,
            );
            *self.inner.heartbeat_tasks.lock().await = Some(tasks);
        }

        Ok(())
    }

    async fn reconnect(&self) -> Result<(), ConnectionError> {
        let _socket_guard = self.inner.socket.lock().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionClosed);
        }
        loop {
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(ConnectionError::ConnectionClosed);
            }
            self.inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            let (delay, host) = {
                let mut hosts = self.inner.hosts.lock().await;
                match hosts.change_host() {
                    Ok(delay) => (delay, hosts.current().clone()),
                    Err(attempts) => return Err(ConnectionError::MaxReconnectAttempts { attempts }),
                }
            };
            self.inner.listener.on_reconnect_attempt(&host.host, self.inner.reconnect_attempts.load(Ordering::SeqCst));
            tokio::time::sleep(Duration::from_millis(delay)).await;

            match self.open_and_handshake(&host).await {
                Ok(()) => {
                    self.inner.hosts.lock().await.on_connected();
                    self.replay_subscriptions().await?;
                    return Ok(());
                }
                Err(e) => {
                    debug!(error = %e, host = %host.host, "reconnect attempt failed, trying next host");
                    continue;
                }
            }
        }
    }

    async fn replay_subscriptions(&self) -> Result<(), ConnectionError> {
        let subscriptions: Vec<Subscription> = {
            let session = self.inner.session.lock().await;
            session.subscriptions.values().cloned().collect()
        };
        for sub in subscriptions {
            let mut frame = Frame::new("SUBSCRIBE");
            for (key, value) in &sub.headers {
                frame = frame.with_header(key.clone(), value.clone())?;
            }
            write_raw(&self.inner, OutboundItem::Frame(frame)).await?;
        }
        Ok(())
    }
}

/// Encode and write one outbound item under the transmit lock, updating
/// heartbeat bookkeeping on success.
async fn write_raw(inner: &Arc<Inner>, item: OutboundItem) -> Result<(), ConnectionError> {
    let mut write = inner.write.lock().await;
    let mut buf = BytesMut::new();
    write.codec.encode(item, &mut buf)?;
    let half = write.half.as_mut().ok_or(ConnectionError::ConnectionClosed)?;
    half.write_all(&buf).await?;
    if inner.config.autoflush {
        half.flush().await?;
    }
    drop(write);
    inner.heartbeat_state.note_write().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostSpec;

    #[test]
    fn null_listener_is_the_default() {
        let listener: Arc<dyn ConnectionListener> = Arc::new(NullListener);
        listener.on_heartbeat_timeout();
        let _ = HostSpec::new("mq", 61613);
    }
}
