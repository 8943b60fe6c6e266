//! Codec-level error taxonomy.

use std::fmt;

/// Errors raised while turning bytes into frames or frames into bytes.
///
/// Mirrors the two codec-level kinds called out at the protocol layer:
/// frames that are incomplete or structurally broken (`MalformedFrame`),
/// and frames that are structurally fine but violate an encoding rule
/// (`ProtocolError`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    MalformedFrame(MalformedReason),
    ProtocolError(ProtocolReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    MissingCommand,
    MissingBlankLine,
    TruncatedBody,
    BadContentLength,
    DuplicateHeaderKey,
    EmbeddedNul,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolReason {
    InvalidEscape,
    InvalidUtf8,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MalformedFrame(reason) => write!(f, "malformed frame: {reason}"),
            FrameError::ProtocolError(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MalformedReason::MissingCommand => "missing command line",
            MalformedReason::MissingBlankLine => "missing blank line before body",
            MalformedReason::TruncatedBody => "body truncated before NUL terminator",
            MalformedReason::BadContentLength => "content-length header is not a valid integer",
            MalformedReason::DuplicateHeaderKey => "duplicate header key in outbound frame",
            MalformedReason::EmbeddedNul => "embedded NUL byte in header key or value",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ProtocolReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolReason::InvalidEscape => "invalid header escape sequence",
            ProtocolReason::InvalidUtf8 => "header bytes are not valid utf-8",
        };
        f.write_str(s)
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(_: std::io::Error) -> Self {
        FrameError::MalformedFrame(MalformedReason::TruncatedBody)
    }
}
