//! Connection configuration: candidate hosts and the options recognized by
//! [`crate::connection::Connection::new`].

use tracing::warn;

/// One candidate broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub login: String,
    pub passcode: String,
    pub host: String,
    pub port: u16,
    pub ssl: bool,
}

pub const DEFAULT_TCP_PORT: u16 = 61613;
pub const DEFAULT_SSL_PORT: u16 = 61612;

impl HostSpec {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        HostSpec {
            login: String::new(),
            passcode: String::new(),
            host,
            port,
            ssl: false,
        }
    }

    pub fn with_credentials(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        let login = login.into();
        if login.contains("://") {
            warn!(login = %login, "login looks like a URL; HostSpec fields are positional (login, passcode, host, port), not a connection URL");
        }
        self.login = login;
        self.passcode = passcode.into();
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn default_port(ssl: bool) -> u16 {
        if ssl { DEFAULT_SSL_PORT } else { DEFAULT_TCP_PORT }
    }
}

/// All options recognized when constructing a [`Connection`](crate::connection::Connection).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hosts: Vec<HostSpec>,
    pub reliable: bool,

    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub use_exponential_back_off: bool,
    pub back_off_multiplier: f64,
    pub max_reconnect_attempts: u32,
    pub randomize: bool,

    pub connect_timeout_ms: u64,
    /// Bounds the time to assemble one frame once its first byte has
    /// arrived; 0 disables the bound. Read by `read_one_frame`.
    pub parse_timeout_ms: u64,

    pub connect_headers: Vec<(String, String)>,

    pub closed_check: bool,
    pub hbser: bool,
    pub stompconn: bool,
    pub usecrlf: bool,
    pub autoflush: bool,
    /// Developer-mode header: when set, a `dmh: true` header rides along on
    /// the CONNECT/STOMP frame.
    pub dmh: bool,

    /// Requested client send/receive heartbeat interval, `(cx, cy)` in ms.
    /// `(0, 0)` disables heartbeating from this side.
    pub heartbeat: (u64, u64),

    /// Heartbeat monitor tolerance factor k; the monitor fails liveness if
    /// no byte has arrived within `k * negotiated_recv_interval`.
    pub heartbeat_tolerance: f64,
}

impl ConnectionConfig {
    pub fn new(hosts: Vec<HostSpec>) -> Self {
        ConnectionConfig {
            hosts,
            reliable: false,
            initial_reconnect_delay_ms: 10,
            max_reconnect_delay_ms: 30_000,
            use_exponential_back_off: true,
            back_off_multiplier: 2.0,
            max_reconnect_attempts: 0,
            randomize: false,
            connect_timeout_ms: 0,
            parse_timeout_ms: 5_000,
            connect_headers: Vec::new(),
            closed_check: true,
            hbser: false,
            stompconn: false,
            usecrlf: false,
            autoflush: false,
            dmh: false,
            heartbeat: (0, 0),
            heartbeat_tolerance: 2.0,
        }
    }

    pub fn reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }

    pub fn randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    pub fn heartbeat(mut self, cx_ms: u64, cy_ms: u64) -> Self {
        self.heartbeat = (cx_ms, cy_ms);
        self
    }

    pub fn backoff(
        mut self,
        initial_ms: u64,
        max_ms: u64,
        multiplier: f64,
        exponential: bool,
    ) -> Self {
        self.initial_reconnect_delay_ms = initial_ms;
        self.max_reconnect_delay_ms = max_ms;
        self.back_off_multiplier = multiplier;
        self.use_exponential_back_off = exponential;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn connect_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_headers.push((key.into(), value.into()));
        self
    }

    pub fn usecrlf(mut self, usecrlf: bool) -> Self {
        self.usecrlf = usecrlf;
        self
    }

    pub fn stompconn(mut self, stompconn: bool) -> Self {
        self.stompconn = stompconn;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_match_stomp_convention() {
        assert_eq!(HostSpec::default_port(false), 61613);
        assert_eq!(HostSpec::default_port(true), 61612);
    }

    #[test]
    fn builder_chains_apply_in_order() {
        let cfg = ConnectionConfig::new(vec![HostSpec::new("mq", 61613)])
            .reliable(true)
            .randomize(true)
            .heartbeat(10_000, 10_000)
            .max_reconnect_attempts(5);
        assert!(cfg.reliable);
        assert!(cfg.randomize);
        assert_eq!(cfg.heartbeat, (10_000, 10_000));
        assert_eq!(cfg.max_reconnect_attempts, 5);
    }
}
