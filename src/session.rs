//! Session state: negotiated protocol version, session id, subscriptions,
//! transaction bookkeeping.

use indexmap::IndexMap;
use stomp_protocol::{Frame, StompVersion};

use crate::error::ConnectionError;

/// A client-held record of one active subscription, replayed verbatim on
/// reconnect.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub headers: IndexMap<String, String>,
}

/// Everything learned from, or required to drive, the CONNECT/CONNECTED
/// exchange and the session it establishes.
pub struct SessionState {
    pub protocol: StompVersion,
    pub session_id: Option<String>,
    pub server_heartbeat: (u64, u64),
    pub connect_frame: Option<Frame>,
    pub disconnect_receipt: Option<Frame>,
    pub closed: bool,
    pub connection_attempts: u32,
    pub current_host_index: usize,
    /// Insertion-ordered so replay happens in the order subscriptions were
    /// created, per the reconnect contract.
    pub subscriptions: IndexMap<String, Subscription>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            protocol: StompVersion::V1_0,
            session_id: None,
            server_heartbeat: (0, 0),
            connect_frame: None,
            disconnect_receipt: None,
            closed: false,
            connection_attempts: 0,
            current_host_index: 0,
            subscriptions: IndexMap::new(),
        }
    }
}

impl SessionState {
    /// Actual send interval this client should heartbeat at: `max(cx, sy)`
    /// if both are nonzero, else 0 (disabled).
    pub fn negotiated_send_interval_ms(&self, client_cx_ms: u64) -> u64 {
        let sy = self.server_heartbeat.1;
        if client_cx_ms != 0 && sy != 0 {
            client_cx_ms.max(sy)
        } else {
            0
        }
    }

    /// Actual interval within which a byte must arrive from the broker:
    /// `max(cy, sx)` if both nonzero, else 0 (disabled).
    pub fn negotiated_recv_interval_ms(&self, client_cy_ms: u64) -> u64 {
        let sx = self.server_heartbeat.0;
        if client_cy_ms != 0 && sx != 0 {
            client_cy_ms.max(sx)
        } else {
            0
        }
    }
}

/// Build the CONNECT (or STOMP, if `stompconn`) frame for the given host and
/// options.
#[allow(clippy::too_many_arguments)]
pub fn build_connect_frame(
    host: &crate::config::HostSpec,
    stompconn: bool,
    accept_versions: &[StompVersion],
    heartbeat: (u64, u64),
    extra_headers: &[(String, String)],
) -> Result<Frame, ConnectionError> {
    let command = if stompconn { "STOMP" } else { "CONNECT" };
    let mut frame = Frame::new(command)
        .with_header(
            "accept-version",
            stomp_protocol::version::accept_version_header(accept_versions),
        )?
        .with_header("host", host.host.clone())?;
    if !host.login.is_empty() {
        frame = frame.with_header("login", host.login.clone())?;
    }
    if !host.passcode.is_empty() {
        frame = frame.with_header("passcode", host.passcode.clone())?;
    }
    if heartbeat != (0, 0) {
        frame = frame.with_header("heart-beat", format!("{},{}", heartbeat.0, heartbeat.1))?;
    }
    for (key, value) in extra_headers {
        frame = frame.with_header(key.clone(), value.clone())?;
    }
    Ok(frame)
}

/// Parse a broker's reply to CONNECT/STOMP. An `ERROR` frame becomes
/// [`ConnectionError::Broker`]; anything else becomes a protocol-level
/// malformed-frame error via the codec's own taxonomy, wrapped the same way.
pub fn parse_connected(frame: Frame) -> Result<SessionState, ConnectionError> {
    if frame.command == "ERROR" {
        let message = frame.header("message").unwrap_or("").to_owned();
        let headers = frame
            .headers()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        return Err(ConnectionError::Broker {
            message,
            headers,
            body: frame.body.clone(),
        });
    }

    let protocol = StompVersion::parse(frame.header("version"));
    let session_id = frame.header("session").map(str::to_owned);
    let server_heartbeat = parse_heartbeat_header(frame.header("heart-beat"));

    Ok(SessionState {
        protocol,
        session_id,
        server_heartbeat,
        connect_frame: Some(frame),
        ..SessionState::default()
    })
}

fn parse_heartbeat_header(raw: Option<&str>) -> (u64, u64) {
    let Some(raw) = raw else {
        return (0, 0);
    };
    let mut parts = raw.split(',');
    let sx = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
    let sy = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
    (sx, sy)
}
