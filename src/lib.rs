//! A resilient STOMP 1.0/1.1/1.2 client connection: host failover,
//! bidirectional heartbeats, and subscription replay across reconnects.
//!
//! The entry point is [`Connection`]; configure it with [`ConnectionConfig`]
//! and a list of [`HostSpec`] candidates, and optionally a
//! [`ConnectionListener`] for lifecycle callbacks.

pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod hosts;
pub mod listener;
pub mod session;
pub mod transport;
pub mod unreceive;

pub use config::{ConnectionConfig, HostSpec};
pub use connection::{Connection, ConnectionSnapshot};
pub use error::ConnectionError;
pub use listener::{ConnectionListener, NullListener};
pub use transport::{TcpTransportFactory, Transport, TransportFactory};
pub use unreceive::{unreceive, UnreceiveOptions};

pub use stomp_protocol::{Frame, StompVersion};
