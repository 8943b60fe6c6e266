//! Byte-stream transport abstraction.
//!
//! The connection core only needs an `AsyncRead + AsyncWrite` handle to one
//! host; how that handle is produced (plain TCP, TLS, a test double) is kept
//! behind [`TransportFactory`] so SSL/TLS parameter plumbing never has to be
//! understood by the reconnect/heartbeat/session logic.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::HostSpec;

/// A connected byte stream to one broker host.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Produces a [`Transport`] for a given [`HostSpec`], honoring an optional
/// connect timeout. Implementations own whatever TLS configuration they
/// need; this trait only sees the outcome.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        host: &HostSpec,
        connect_timeout: Option<Duration>,
    ) -> std::io::Result<Box<dyn Transport>>;
}

/// Plain TCP transport factory. `HostSpec::ssl` is rejected here rather than
/// silently ignored — a caller wanting TLS must supply their own
/// `TransportFactory`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransportFactory;

#[async_trait]
impl TransportFactory for TcpTransportFactory {
    async fn connect(
        &self,
        host: &HostSpec,
        connect_timeout: Option<Duration>,
    ) -> std::io::Result<Box<dyn Transport>> {
        if host.ssl {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "TcpTransportFactory cannot open an SSL host; supply a TransportFactory that does",
            ));
        }
        let addr = format!("{}:{}", host.host, host.port);
        let connecting = TcpStream::connect(addr);
        let stream = match connect_timeout {
            Some(d) => timeout(d, connecting)
                .await
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??,
            None => connecting.await?,
        };
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
