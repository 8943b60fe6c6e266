//! Turns bytes on the wire into [`Frame`]s (and bare heartbeat bytes) and
//! back, following the per-version escaping rules in [`crate::escape`].

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, MalformedReason, ProtocolReason};
use crate::escape;
use crate::frame::Frame;
use crate::version::StompVersion;

/// One unit of decoded traffic: either a complete frame, or the single
/// LINE-END byte(s) used as a heartbeat when no frame is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Frame(Frame),
    HeartBeat,
}

/// An outbound item: a frame to serialize, or a bare heartbeat byte.
#[derive(Debug, Clone)]
pub enum OutboundItem {
    Frame(Frame),
    HeartBeat,
}

/// Stateful per-connection codec. Carries the negotiated protocol version
/// (escaping rules) and line-ending choice; both may change once, right
/// after CONNECTED is parsed, via [`StompCodec::set_version`].
#[derive(Debug, Clone)]
pub struct StompCodec {
    version: StompVersion,
    use_crlf: bool,
}

impl StompCodec {
    pub fn new(version: StompVersion, use_crlf: bool) -> Self {
        StompCodec { version, use_crlf }
    }

    pub fn set_version(&mut self, version: StompVersion) {
        self.version = version;
    }

    fn line_end(&self) -> &'static [u8] {
        if self.use_crlf { b"\r\n" } else { b"\n" }
    }
}

impl Default for StompCodec {
    fn default() -> Self {
        StompCodec::new(StompVersion::V1_0, false)
    }
}

impl Encoder<OutboundItem> for StompCodec {
    type Error = FrameError;

    fn encode(&mut self, item: OutboundItem, dst: &mut BytesMut) -> Result<(), FrameError> {
        match item {
            OutboundItem::HeartBeat => {
                dst.extend_from_slice(self.line_end());
                Ok(())
            }
            OutboundItem::Frame(frame) => {
                let needed = frame.command.len()
                    + frame.body.len()
                    + frame.headers().map(|(k, v)| k.len() + v.len() + 2).sum::<usize>()
                    + 32;
                dst.reserve(needed);
                dst.extend_from_slice(frame.command.as_bytes());
                dst.extend_from_slice(self.line_end());
                for (key, value) in frame.headers() {
                    dst.extend_from_slice(escape::escape(key, self.version).as_bytes());
                    dst.put_u8(b':');
                    dst.extend_from_slice(escape::escape(value, self.version).as_bytes());
                    dst.extend_from_slice(self.line_end());
                }
                dst.extend_from_slice(self.line_end());
                dst.extend_from_slice(&frame.body);
                dst.put_u8(0);
                Ok(())
            }
        }
    }
}

impl Decoder for StompCodec {
    type Item = WireEvent;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WireEvent>, FrameError> {
        if src.is_empty() {
            return Ok(None);
        }

        // A heartbeat is a lone LINE-END preceding any command bytes.
        if src[0] == b'\n' {
            src.advance(1);
            return Ok(Some(WireEvent::HeartBeat));
        }
        if src.len() >= 2 && src[0] == b'\r' && src[1] == b'\n' {
            src.advance(2);
            return Ok(Some(WireEvent::HeartBeat));
        }

        let Some(cmd_end) = find_line_end(src, 0) else {
            return Ok(None);
        };
        let command = decode_utf8(&src[..cmd_end.content_end])?;
        if command.is_empty() {
            return Err(FrameError::MalformedFrame(MalformedReason::MissingCommand));
        }

        let mut frame = Frame::new(command);
        let mut cursor = cmd_end.next_start;
        loop {
            let Some(line) = find_line_end(src, cursor) else {
                return Ok(None);
            };
            if line.content_end == cursor {
                // blank line: header section complete
                cursor = line.next_start;
                break;
            }
            let raw_line = decode_utf8(&src[cursor..line.content_end])?;
            let Some(colon) = raw_line.find(':') else {
                return Err(FrameError::MalformedFrame(MalformedReason::MissingBlankLine));
            };
            let key = escape::unescape(&raw_line[..colon], self.version)?;
            let value = escape::unescape(&raw_line[colon + 1..], self.version)?;
            frame.insert_parsed_header(key, value);
            cursor = line.next_start;
        }

        let body_len = frame.content_length()?;
        let (body_end, after_nul) = match body_len {
            Some(len) => {
                let body_end = cursor + len;
                if src.len() <= body_end {
                    return Ok(None);
                }
                if src[body_end] != 0 {
                    return Err(FrameError::MalformedFrame(MalformedReason::BadContentLength));
                }
                (body_end, body_end + 1)
            }
            None => {
                let Some(nul_offset) = src[cursor..].iter().position(|&b| b == 0) else {
                    return Ok(None);
                };
                let body_end = cursor + nul_offset;
                (body_end, body_end + 1)
            }
        };

        frame.body = src[cursor..body_end].to_vec();
        src.advance(after_nul);
        Ok(Some(WireEvent::Frame(frame)))
    }
}

struct LineEnd {
    /// index one past the last content byte (i.e. start of the LINE-END sequence)
    content_end: usize,
    /// index right after the LINE-END sequence
    next_start: usize,
}

/// Find the next LF or CRLF starting at `from`, tolerating either on input
/// regardless of `use_crlf` (inbound accepts either, per the wire spec).
fn find_line_end(buf: &BytesMut, from: usize) -> Option<LineEnd> {
    let rel = buf[from..].iter().position(|&b| b == b'\n')?;
    let lf_at = from + rel;
    if lf_at > from && buf[lf_at - 1] == b'\r' {
        Some(LineEnd {
            content_end: lf_at - 1,
            next_start: lf_at + 1,
        })
    } else {
        Some(LineEnd {
            content_end: lf_at,
            next_start: lf_at + 1,
        })
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, FrameError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| FrameError::ProtocolError(ProtocolReason::InvalidUtf8))
}
