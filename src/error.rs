//! The error taxonomy surfaced by [`crate::connection::Connection`].

use stomp_protocol::FrameError;

/// Everything a caller of [`Connection`](crate::connection::Connection) can
/// receive back from a public operation.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("no current connection")]
    NoCurrentConnection,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("message-id header is required for this operation")]
    MessageIdRequired,

    #[error("a subscription id is required (pass one explicitly or set the id header)")]
    SubscriptionRequired,

    #[error("subscription id {0:?} is already in use")]
    DuplicateSubscription(String),

    #[error("operation unsupported at negotiated protocol version {0}")]
    UnsupportedProtocol(stomp_protocol::StompVersion),

    #[error("frame codec: {0}")]
    Frame(#[from] FrameError),

    #[error("broker sent ERROR: {message}")]
    Broker {
        message: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },

    #[error("heartbeat send failed: {0}")]
    HeartbeatSend(String),

    #[error("no heartbeat received within tolerance window")]
    HeartbeatRecv,

    #[error("host pool exhausted after {attempts} attempt(s)")]
    MaxReconnectAttempts { attempts: u32 },

    #[error("parse timeout exceeded while assembling a frame")]
    ParseTimeout,

    #[error("transport I/O error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("the call in flight should be re-driven by the caller after reconnect")]
    RetryPending,
}
