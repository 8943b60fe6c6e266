//! Protocol version negotiation helpers.

use std::fmt;

/// A negotiated STOMP protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StompVersion {
    V1_0,
    V1_1,
    V1_2,
}

impl StompVersion {
    /// Parse the `version` header value from a CONNECTED frame.
    /// Absent or unrecognized values default to 1.0, per the wire spec.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("1.1") => StompVersion::V1_1,
            Some("1.2") => StompVersion::V1_2,
            _ => StompVersion::V1_0,
        }
    }

    pub fn as_header_value(self) -> &'static str {
        match self {
            StompVersion::V1_0 => "1.0",
            StompVersion::V1_1 => "1.1",
            StompVersion::V1_2 => "1.2",
        }
    }

    /// Whether this revision escapes header keys/values at all.
    pub fn escapes_headers(self) -> bool {
        self != StompVersion::V1_0
    }

    /// Whether this revision additionally escapes bare `\r`.
    pub fn escapes_cr(self) -> bool {
        self == StompVersion::V1_2
    }

    pub fn supports_nack(self) -> bool {
        self >= StompVersion::V1_1
    }

    /// Whether this revision negotiates heart-beat headers at all.
    pub fn supports_heartbeat(self) -> bool {
        self >= StompVersion::V1_1
    }

    /// Whether a subscription id is mandatory for SUBSCRIBE/ACK/NACK.
    pub fn requires_subscription_id(self) -> bool {
        self >= StompVersion::V1_1
    }
}

impl fmt::Display for StompVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_header_value())
    }
}

/// The client-side `accept-version` list offered during CONNECT/STOMP.
pub fn accept_version_header(versions: &[StompVersion]) -> String {
    versions
        .iter()
        .map(|v| v.as_header_value())
        .collect::<Vec<_>>()
        .join(",")
}

pub const ALL_VERSIONS: [StompVersion; 3] = [
    StompVersion::V1_0,
    StompVersion::V1_1,
    StompVersion::V1_2,
];
