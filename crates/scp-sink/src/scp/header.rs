//! Byte-level parser for the `C<mode> <size> <name>\n` header line.
//!
//! The leading `C` has already been consumed by the acknowledgment read.
//! Each field is read through its own bounded buffer so nothing carries
//! over from one field to the next.

use crate::scp::ack::{read_byte, LINE_FEED};
use crate::scp::error::{ScpError, ScpResult};
use crate::scp::types::{FileHeader, ScpSinkOptions};
use std::io::Read;

pub const HEADER_FILE: u8 = b'C';
pub const SPACE: u8 = b' ';

/// Longest mode token accepted (`0644` or a 5-character variant).
const MAX_MODE_LEN: usize = 5;
/// `u64::MAX` has 20 decimal digits.
const MAX_SIZE_DIGITS: usize = 20;

/// Limits applied while parsing a header.
#[derive(Debug, Clone, Copy)]
pub struct HeaderLimits {
    pub max_file_size: Option<u64>,
    pub max_name_length: usize,
}

impl HeaderLimits {
    pub fn from_options(options: &ScpSinkOptions) -> Self {
        Self {
            max_file_size: options.max_file_size,
            max_name_length: options.max_name_length,
        }
    }
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self::from_options(&ScpSinkOptions::default())
    }
}

/// Read bytes up to (not including) `terminator`, failing if more than
/// `max_len` bytes precede it or the stream ends first.
pub fn read_field<R: Read>(
    reader: &mut R,
    terminator: u8,
    max_len: usize,
    field: &str,
) -> ScpResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(max_len.min(256));
    loop {
        let byte = read_byte(reader)
            .map_err(|e| ScpError::from_stream(&format!("Failed to read header {}", field), e))?
            .ok_or_else(|| {
                ScpError::protocol(format!("Stream ended while reading header {}", field))
            })?;
        if byte == terminator {
            return Ok(buf);
        }
        if buf.len() >= max_len {
            return Err(ScpError::protocol(format!(
                "Header {} exceeds {} bytes",
                field, max_len
            )));
        }
        buf.push(byte);
    }
}

/// Permission token before the first space. Its digits are not validated.
pub fn read_mode<R: Read>(reader: &mut R) -> ScpResult<String> {
    let raw = read_field(reader, SPACE, MAX_MODE_LEN, "mode")?;
    if raw.len() < 4 {
        return Err(ScpError::protocol(format!(
            "Header mode '{}' is shorter than 4 characters",
            String::from_utf8_lossy(&raw)
        )));
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Decimal byte count before the second space.
pub fn read_size<R: Read>(reader: &mut R, max_file_size: Option<u64>) -> ScpResult<u64> {
    let digits = read_field(reader, SPACE, MAX_SIZE_DIGITS, "size")?;
    if digits.is_empty() {
        return Err(ScpError::protocol("Header size field is empty"));
    }

    let mut size: u64 = 0;
    for &d in &digits {
        if !d.is_ascii_digit() {
            return Err(ScpError::protocol(format!(
                "Header size '{}' is not a decimal number",
                String::from_utf8_lossy(&digits)
            )));
        }
        size = size
            .checked_mul(10)
            .and_then(|s| s.checked_add(u64::from(d - b'0')))
            .ok_or_else(|| {
                ScpError::protocol(format!(
                    "Header size '{}' overflows 64 bits",
                    String::from_utf8_lossy(&digits)
                ))
            })?;
    }

    if let Some(max) = max_file_size {
        if size > max {
            return Err(ScpError::protocol(format!(
                "Header size {} exceeds the {} byte limit",
                size, max
            )));
        }
    }
    Ok(size)
}

/// Raw name bytes before the terminating line feed. May be empty; whether
/// that is usable depends on the destination.
pub fn read_name<R: Read>(reader: &mut R, max_name_length: usize) -> ScpResult<Vec<u8>> {
    read_field(reader, LINE_FEED, max_name_length, "name")
}

/// Parse everything after the leading `C` up to and including the line feed.
pub fn parse_header_line<R: Read>(reader: &mut R, limits: HeaderLimits) -> ScpResult<FileHeader> {
    let mode = read_mode(reader)?;
    let size = read_size(reader, limits.max_file_size)?;
    let name = read_name(reader, limits.max_name_length)?;
    Ok(FileHeader { mode, size, name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scp::error::ScpErrorKind;
    use std::io::Cursor;

    fn parse(line: &[u8]) -> ScpResult<FileHeader> {
        parse_header_line(&mut Cursor::new(line.to_vec()), HeaderLimits::default())
    }

    #[test]
    fn parse_typical_header() {
        let header = parse(b"0644 1234 report.txt\n").unwrap();
        assert_eq!(header.mode, "0644");
        assert_eq!(header.size, 1234);
        assert_eq!(header.name, b"report.txt".to_vec());
    }

    #[test]
    fn parse_leaves_payload_unread() {
        let mut input = Cursor::new(b"0600 3 k\nabc".to_vec());
        let header = parse_header_line(&mut input, HeaderLimits::default()).unwrap();
        assert_eq!(header.size, 3);
        let mut rest = Vec::new();
        input.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"abc".to_vec());
    }

    #[test]
    fn parse_five_char_mode() {
        let header = parse(b"10644 0 a\n").unwrap();
        assert_eq!(header.mode, "10644");
        assert_eq!(header.size, 0);
    }

    #[test]
    fn parse_name_with_spaces_and_raw_bytes() {
        let header = parse(b"0644 1 my file \xff.bin\n").unwrap();
        assert_eq!(header.name, b"my file \xff.bin".to_vec());
    }

    #[test]
    fn reject_non_digit_size() {
        let err = parse(b"0644 12a4 x\n").unwrap_err();
        assert_eq!(err.kind(), ScpErrorKind::Protocol);
    }

    #[test]
    fn reject_empty_size() {
        let err = parse(b"0644  x\n").unwrap_err();
        assert_eq!(err.kind(), ScpErrorKind::Protocol);
    }

    #[test]
    fn reject_overflowing_size() {
        // u64::MAX + 1
        let err = parse(b"0644 18446744073709551616 x\n").unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn accept_u64_max_size() {
        let header = parse(b"0644 18446744073709551615 x\n").unwrap();
        assert_eq!(header.size, u64::MAX);
    }

    #[test]
    fn reject_size_over_limit() {
        let limits = HeaderLimits {
            max_file_size: Some(100),
            max_name_length: 64,
        };
        let err = parse_header_line(&mut Cursor::new(b"0644 101 x\n".to_vec()), limits).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn reject_long_mode() {
        let err = parse(b"006444 1 x\n").unwrap_err();
        assert_eq!(err.kind(), ScpErrorKind::Protocol);
    }

    #[test]
    fn reject_short_mode() {
        let err = parse(b"644 1 x\n").unwrap_err();
        assert_eq!(err.kind(), ScpErrorKind::Protocol);
    }

    #[test]
    fn reject_long_name() {
        let limits = HeaderLimits {
            max_file_size: None,
            max_name_length: 4,
        };
        let err =
            parse_header_line(&mut Cursor::new(b"0644 1 abcde\n".to_vec()), limits).unwrap_err();
        assert_eq!(err.kind(), ScpErrorKind::Protocol);
    }

    #[test]
    fn parse_empty_name() {
        let header = parse(b"0644 1 \n").unwrap();
        assert!(header.name.is_empty());
        assert_eq!(header.size, 1);
    }

    #[test]
    fn eof_in_each_field_is_protocol_error() {
        for truncated in [&b"064"[..], b"0644 12", b"0644 12 name-without-lf"] {
            let err = parse(truncated).unwrap_err();
            assert_eq!(err.kind(), ScpErrorKind::Protocol, "input {:?}", truncated);
        }
    }
}
