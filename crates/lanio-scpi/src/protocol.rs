//! Framing for SCPI-style instrument traffic.
//!
//! Text commands and responses are single lines ended by a configurable
//! newline token. Binary payloads use IEEE 488.2 definite-length blocks:
//!
//! ```text
//! #<N><N decimal digits giving the length><length payload bytes>
//! ```
//!
//! e.g. `#15HELLO` or `#3012<12 bytes>`. The indefinite form (`#0`) is not
//! accepted.

use lanio_core::error::{Error, Result};

/// Newline token used when none is configured.
pub const DEFAULT_NEWLINE: &str = "\n";

/// First byte of every definite-length block header.
pub const HEADER_MARKER: u8 = b'#';

/// How many whitespace bytes may precede a block header before the stream
/// is treated as malformed.
pub const MAX_LEADING_WHITESPACE: usize = 16;

/// Encode a text command for the wire, appending `newline` when given.
///
/// An empty `newline` appends nothing.
pub fn encode_line(message: &str, newline: Option<&str>) -> Vec<u8> {
    let newline = newline.unwrap_or("");
    let mut out = Vec::with_capacity(message.len() + newline.len());
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(newline.as_bytes());
    out
}

/// Strip one trailing `terminator` from `line`, if present.
pub fn trim_terminator<'a>(line: &'a [u8], terminator: &[u8]) -> &'a [u8] {
    if terminator.is_empty() {
        return line;
    }
    line.strip_suffix(terminator).unwrap_or(line)
}

/// Whether `byte` may precede a block header (left over from a previous
/// response's terminator, for instance).
pub fn is_leading_whitespace(byte: u8) -> bool {
    matches!(byte, b'\r' | b'\n' | b' ' | b'\t')
}

/// A parsed definite-length block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Number of digits in the length field (1..=9).
    pub digits: u8,
    /// Payload length in bytes.
    pub length: usize,
}

impl BlockHeader {
    /// Total header size on the wire, marker included.
    pub fn encoded_len(&self) -> usize {
        2 + self.digits as usize
    }
}

/// Parse the digit-count byte that follows the `#` marker.
pub fn parse_digit_count(byte: u8) -> Result<u8> {
    match byte {
        b'1'..=b'9' => Ok(byte - b'0'),
        b'0' => Err(Error::BadFormat(
            "indefinite-length block (#0) is not supported".into(),
        )),
        other => Err(Error::BadFormat(format!(
            "invalid block header digit count: 0x{other:02X}"
        ))),
    }
}

/// Parse the decimal length field of a block header.
pub fn parse_block_length(field: &[u8]) -> Result<usize> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(Error::BadFormat(format!(
            "invalid block length field: {:?}",
            String::from_utf8_lossy(field)
        )));
    }
    field
        .iter()
        .try_fold(0usize, |acc, d| {
            acc.checked_mul(10)?.checked_add(usize::from(d - b'0'))
        })
        .ok_or_else(|| Error::BadFormat("block length overflows usize".into()))
}

/// Parse a complete header (marker, digit count, length field) from the
/// start of `buf`.
///
/// Returns `Ok(None)` if `buf` is too short to hold the whole header.
pub fn parse_block_header(buf: &[u8]) -> Result<Option<BlockHeader>> {
    let Some(&marker) = buf.first() else {
        return Ok(None);
    };
    if marker != HEADER_MARKER {
        return Err(Error::BadFormat(format!(
            "expected block header '#', got 0x{marker:02X}"
        )));
    }
    let Some(&count) = buf.get(1) else {
        return Ok(None);
    };
    let digits = parse_digit_count(count)?;
    let Some(field) = buf.get(2..2 + digits as usize) else {
        return Ok(None);
    };
    let length = parse_block_length(field)?;
    Ok(Some(BlockHeader { digits, length }))
}

/// Build a definite-length block around `payload`.
///
/// Instruments accept binary uploads (waveforms, setups) in this form.
/// The length field holds at most nine digits.
pub fn encode_block(payload: &[u8]) -> Result<Vec<u8>> {
    let length = payload.len().to_string();
    if length.len() > 9 {
        return Err(Error::BadFormat(format!(
            "block payload of {} bytes is too large for a definite-length header",
            payload.len()
        )));
    }
    let mut out = Vec::with_capacity(2 + length.len() + payload.len());
    out.push(HEADER_MARKER);
    out.push(b'0' + length.len() as u8);
    out.extend_from_slice(length.as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Parse a device-clear port number from a query reply.
pub fn parse_port(reply: &str) -> Result<u16> {
    let text = reply.trim();
    match text.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(Error::BadFormat(format!(
            "reply is not a TCP port: {text:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_line_appends_newline() {
        assert_eq!(encode_line("*IDN?", Some("\n")), b"*IDN?\n");
        assert_eq!(encode_line("*RST", Some("\r\n")), b"*RST\r\n");
        assert_eq!(encode_line("*RST", None), b"*RST");
        assert_eq!(encode_line("", Some("\n")), b"\n");
    }

    #[test]
    fn trim_terminator_strips_once() {
        assert_eq!(trim_terminator(b"1.0\n", b"\n"), b"1.0");
        assert_eq!(trim_terminator(b"1.0\n\n", b"\n"), b"1.0\n");
        assert_eq!(trim_terminator(b"1.0", b"\n"), b"1.0");
        assert_eq!(trim_terminator(b"1.0\r\n", b"\r\n"), b"1.0");
        assert_eq!(trim_terminator(b"1.0\n", b""), b"1.0\n");
    }

    #[test]
    fn header_single_digit() {
        let header = parse_block_header(b"#15HELLO").unwrap().unwrap();
        assert_eq!(header, BlockHeader { digits: 1, length: 5 });
        assert_eq!(header.encoded_len(), 3);
    }

    #[test]
    fn header_multi_digit_with_leading_zeros() {
        let header = parse_block_header(b"#3012").unwrap().unwrap();
        assert_eq!(header, BlockHeader { digits: 3, length: 12 });
        assert_eq!(header.encoded_len(), 5);
    }

    #[test]
    fn header_incomplete() {
        assert_eq!(parse_block_header(b"").unwrap(), None);
        assert_eq!(parse_block_header(b"#").unwrap(), None);
        assert_eq!(parse_block_header(b"#4").unwrap(), None);
        assert_eq!(parse_block_header(b"#410").unwrap(), None);
    }

    #[test]
    fn header_rejects_bad_marker() {
        let err = parse_block_header(b"X15HELLO").unwrap_err();
        assert!(matches!(err, Error::BadFormat(_)));
    }

    #[test]
    fn header_rejects_indefinite() {
        let err = parse_block_header(b"#0ABC\n").unwrap_err();
        assert!(err.to_string().contains("indefinite"));
    }

    #[test]
    fn header_rejects_non_digit_count() {
        assert!(parse_digit_count(b'A').is_err());
        assert!(parse_digit_count(b' ').is_err());
        assert_eq!(parse_digit_count(b'9').unwrap(), 9);
    }

    #[test]
    fn length_rejects_garbage() {
        assert!(parse_block_length(b"").is_err());
        assert!(parse_block_length(b"1x").is_err());
        assert!(parse_block_length(b"-1").is_err());
        assert_eq!(parse_block_length(b"000").unwrap(), 0);
        assert_eq!(parse_block_length(b"999999999").unwrap(), 999_999_999);
    }

    #[test]
    fn encode_block_header() {
        assert_eq!(encode_block(b"HELLO").unwrap(), b"#15HELLO");
        assert_eq!(encode_block(b"").unwrap(), b"#10");
        let payload = vec![0xAAu8; 1234];
        let block = encode_block(&payload).unwrap();
        assert_eq!(&block[..6], b"#41234");
        let header = parse_block_header(&block).unwrap().unwrap();
        assert_eq!(header.length, 1234);
        assert_eq!(&block[header.encoded_len()..], &payload[..]);
    }

    #[test]
    fn leading_whitespace() {
        assert!(is_leading_whitespace(b'\n'));
        assert!(is_leading_whitespace(b'\r'));
        assert!(!is_leading_whitespace(b'#'));
        assert!(!is_leading_whitespace(b'0'));
    }

    #[test]
    fn port_reply() {
        assert_eq!(parse_port("5000\n").unwrap(), 5000);
        assert_eq!(parse_port(" 5025 ").unwrap(), 5025);
        assert!(parse_port("0").is_err());
        assert!(parse_port("70000").is_err());
        assert!(parse_port("N/A").is_err());
    }
}
