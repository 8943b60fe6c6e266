//! Header value escaping, per STOMP protocol version.
//!
//! 1.0 never escapes. 1.1 escapes `\`, newline and `:`. 1.2 adds `\r`.

use crate::error::{FrameError, ProtocolReason};
use crate::version::StompVersion;

/// Escape a single header key or value for emission on the wire.
pub fn escape(raw: &str, version: StompVersion) -> String {
    if !version.escapes_headers() {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            '\r' if version.escapes_cr() => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse `escape`. Returns `ProtocolError(InvalidEscape)` on a dangling
/// backslash or an escape sequence this version doesn't define.
pub fn unescape(raw: &str, version: StompVersion) -> Result<String, FrameError> {
    if !version.escapes_headers() {
        return Ok(raw.to_owned());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some('r') if version.escapes_cr() => out.push('\r'),
            _ => {
                return Err(FrameError::ProtocolError(ProtocolReason::InvalidEscape));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_0_passes_through_verbatim() {
        let raw = "a:b\\c\nd";
        assert_eq!(escape(raw, StompVersion::V1_0), raw);
    }

    #[test]
    fn v1_1_escapes_colon_newline_backslash() {
        let escaped = escape("a:b\\c\nd", StompVersion::V1_1);
        assert_eq!(escaped, "a\\cb\\\\c\\nd");
    }

    #[test]
    fn v1_1_does_not_escape_cr() {
        let escaped = escape("a\rb", StompVersion::V1_1);
        assert_eq!(escaped, "a\rb");
    }

    #[test]
    fn v1_2_also_escapes_cr() {
        let escaped = escape("a\rb", StompVersion::V1_2);
        assert_eq!(escaped, "a\\rb");
    }

    #[test]
    fn round_trip_v1_1() {
        for raw in ["plain", "has:colon", "back\\slash", "new\nline", "a\rb"] {
            let escaped = escape(raw, StompVersion::V1_1);
            let back = unescape(&escaped, StompVersion::V1_1).unwrap();
            assert_eq!(back, raw);
        }
    }

    #[test]
    fn round_trip_v1_2() {
        for raw in ["plain", "has:colon", "back\\slash", "new\nline", "carriage\rreturn"] {
            let escaped = escape(raw, StompVersion::V1_2);
            let back = unescape(&escaped, StompVersion::V1_2).unwrap();
            assert_eq!(back, raw);
        }
    }

    #[test]
    fn dangling_backslash_is_invalid_escape() {
        let err = unescape("trailing\\", StompVersion::V1_1).unwrap_err();
        assert_eq!(
            err,
            FrameError::ProtocolError(ProtocolReason::InvalidEscape)
        );
    }

    #[test]
    fn cr_escape_invalid_under_1_1() {
        let err = unescape("a\\rb", StompVersion::V1_1).unwrap_err();
        assert_eq!(
            err,
            FrameError::ProtocolError(ProtocolReason::InvalidEscape)
        );
    }
}
