//! The wire-level frame model: command, headers, body.

use indexmap::IndexMap;

use crate::error::{FrameError, MalformedReason};

/// A single STOMP frame: command line, header mapping, opaque body bytes.
///
/// `headers` holds the first occurrence of each key (the lookup-relevant
/// view); `repeated` holds any later occurrences of an already-seen key, in
/// wire order, as the parallel multi-valued view inbound 1.1/1.2 frames are
/// permitted to carry. Outbound construction rejects duplicate keys outright
/// via [`Frame::push_header`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    headers: IndexMap<String, String>,
    repeated: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Frame {
            command: command.into(),
            headers: IndexMap::new(),
            repeated: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Insert a header, preserving insertion order. Returns an error if the
    /// key is already present — outbound frames forbid duplicate keys — or
    /// if either the key or value contains an embedded NUL byte, which would
    /// be indistinguishable from the frame terminator on the wire.
    pub fn push_header(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), FrameError> {
        let key = key.into();
        let value = value.into();
        if key.contains('\0') || value.contains('\0') {
            return Err(FrameError::MalformedFrame(MalformedReason::EmbeddedNul));
        }
        if self.headers.contains_key(&key) {
            return Err(FrameError::MalformedFrame(MalformedReason::DuplicateHeaderKey));
        }
        self.headers.insert(key, value);
        Ok(())
    }

    /// Record an already-parsed header. Used by the decoder, where a
    /// duplicate key under 1.1/1.2 is not an error: the first occurrence
    /// wins the lookup map, later ones land in the multi-valued view.
    pub(crate) fn insert_parsed_header(&mut self, key: String, value: String) {
        if self.headers.contains_key(&key) {
            self.repeated.push((key, value));
        } else {
            self.headers.insert(key, value);
        }
    }

    pub fn with_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, FrameError> {
        self.push_header(key, value)?;
        Ok(self)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First-occurrence value for `key`, if present.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// All values recorded for `key`, in wire order (first occurrence
    /// first, then any repeats).
    pub fn header_all(&self, key: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self.headers.get(key).map(String::as_str).into_iter().collect();
        out.extend(
            self.repeated
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
        );
        out
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn content_length(&self) -> Result<Option<usize>, FrameError> {
        match self.header("content-length") {
            None => Ok(None),
            Some(raw) => raw
                .parse::<usize>()
                .map(Some)
                .map_err(|_| FrameError::MalformedFrame(MalformedReason::BadContentLength)),
        }
    }

    pub fn body_str(&self) -> Result<&str, FrameError> {
        std::str::from_utf8(&self.body)
            .map_err(|_| FrameError::ProtocolError(crate::error::ProtocolReason::InvalidUtf8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_header_rejects_duplicates() {
        let mut f = Frame::new("SEND");
        f.push_header("destination", "/queue/a").unwrap();
        assert!(f.push_header("destination", "/queue/b").is_err());
    }

    #[test]
    fn insert_parsed_header_keeps_first_occurrence_and_repeats() {
        let mut f = Frame::new("MESSAGE");
        f.insert_parsed_header("foo".into(), "first".into());
        f.insert_parsed_header("foo".into(), "second".into());
        assert_eq!(f.header("foo"), Some("first"));
        assert_eq!(f.header_all("foo"), vec!["first", "second"]);
    }

    #[test]
    fn content_length_parses_when_present() {
        let f = Frame::new("SEND").with_header("content-length", "4").unwrap();
        assert_eq!(f.content_length().unwrap(), Some(4));
    }

    #[test]
    fn content_length_none_when_absent() {
        let f = Frame::new("SEND");
        assert_eq!(f.content_length().unwrap(), None);
    }

    #[test]
    fn bad_content_length_is_malformed() {
        let f = Frame::new("SEND").with_header("content-length", "oops").unwrap();
        assert!(f.content_length().is_err());
    }

    #[test]
    fn with_header_rejects_embedded_nul() {
        assert!(Frame::new("SEND").with_header("x-evil", "a\0b").is_err());
        assert!(Frame::new("SEND").with_header("x\0evil", "a").is_err());
    }

    #[test]
    fn with_header_rejects_duplicates() {
        let f = Frame::new("SEND").with_header("destination", "/queue/a").unwrap();
        assert!(f.with_header("destination", "/queue/b").is_err());
    }
}
