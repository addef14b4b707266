//! Response body decoding
//!
//! Bodies arrive as `JSONCompactEachRow`: one JSON array per line. When a query
//! fails after headers were sent, ClickHouse appends its exception text
//! (`Code: 241. DB::Exception: ...`) to the body instead of a row.

use bytes::{Bytes, BytesMut};

/// Maximum length of a single row line (64 MB)
///
/// Lines longer than this are rejected instead of growing the buffer forever.
pub const MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

/// One framed line of a response body
#[derive(Debug, Clone, PartialEq)]
pub enum BodyLine {
    /// Decoded row columns
    Row(Vec<serde_json::Value>),
    /// Server exception written into the body
    Exception {
        /// Exception code, if present
        code: Option<u32>,
        /// Full exception text
        message: String,
    },
}

/// Decode errors (mapped onto crate errors by the stream)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Line is not a JSON array
    Malformed(String),
    /// Line exceeds [`MAX_LINE_LENGTH`]
    TooLong(usize),
}

/// Split the next complete line off `buf`
///
/// Returns `Ok(None)` when no full line is buffered yet. The trailing `\n` (and
/// `\r`) are stripped; empty lines are skipped.
pub fn next_line(buf: &mut BytesMut) -> Result<Option<Bytes>, DecodeError> {
    next_line_from(buf, &mut 0)
}

/// [`next_line`] for a buffer that is filled across calls
///
/// `scanned` counts leading bytes of `buf` already known to hold no `\n`, so a
/// long line arriving in many chunks is scanned once. It must start at 0 and is
/// reset whenever a line is split off.
pub fn next_line_from(
    buf: &mut BytesMut,
    scanned: &mut usize,
) -> Result<Option<Bytes>, DecodeError> {
    loop {
        let start = (*scanned).min(buf.len());
        let found = buf[start..].iter().position(|&b| b == b'\n');
        let Some(pos) = found.map(|i| start + i) else {
            *scanned = buf.len();
            if buf.len() > MAX_LINE_LENGTH {
                return Err(DecodeError::TooLong(buf.len()));
            }
            return Ok(None);
        };

        *scanned = 0;
        let mut line = buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        if line.is_empty() {
            continue;
        }
        return Ok(Some(line.freeze()));
    }
}

/// Take whatever is left once the body has ended
pub fn trailing_line(buf: &mut BytesMut) -> Option<Bytes> {
    let rest = buf.split().freeze();
    let trimmed = trim_ascii(&rest);
    if trimmed.is_empty() {
        None
    } else {
        Some(Bytes::copy_from_slice(trimmed))
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

/// Decode one framed line
pub fn decode_line(line: &[u8]) -> Result<BodyLine, DecodeError> {
    if let Some((code, message)) = parse_exception(line) {
        return Ok(BodyLine::Exception { code, message });
    }

    match serde_json::from_slice::<serde_json::Value>(line) {
        Ok(serde_json::Value::Array(columns)) => Ok(BodyLine::Row(columns)),
        Ok(other) => Err(DecodeError::Malformed(format!(
            "expected JSON array per row, got {}",
            other
        ))),
        Err(e) => Err(DecodeError::Malformed(format!(
            "invalid row JSON: {} (line: {})",
            e,
            String::from_utf8_lossy(&line[..line.len().min(120)])
        ))),
    }
}

/// Recognize `Code: <n>. DB::Exception: ...`
pub fn parse_exception(line: &[u8]) -> Option<(Option<u32>, String)> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if !text.starts_with("Code:") || !text.contains("Exception") {
        return None;
    }

    let code = text["Code:".len()..]
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok());

    Some((code, text.to_string()))
}

/// Parse an exception code header value
pub fn parse_exception_code(value: &str) -> Option<u32> {
    value.trim().parse().ok()
}
