//! Incremental RESP Reply Parser
//!
//! Parses server replies out of a streaming read buffer. TCP delivers
//! arbitrary fragments, so the parser must handle partial data and resume
//! once more bytes arrive:
//!
//! - `Ok(Some((value, consumed)))` - a complete reply, `consumed` bytes used
//! - `Ok(None)` - the reply is incomplete, read more first
//! - `Err(ParseError)` - the stream is not valid RESP
//!
//! The store client appends network data to a `BytesMut`, calls
//! [`parse_reply`], advances the buffer by `consumed` on success, and repeats
//! until it has collected one reply per pipelined command.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a reply.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown reply prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer or length field
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, over-deep nesting, ...)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The reply exceeds the maximum allowed size
    #[error("reply too large: {size} bytes (max: {max})")]
    ReplyTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string accepted from the store.
///
/// Session records and index members are tiny; anything near this limit
/// means we are not actually talking to the session store.
pub const MAX_BULK_SIZE: usize = 8 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow on a hostile peer)
pub const MAX_NESTING_DEPTH: usize = 8;

/// Attempts to parse one complete reply from the front of `buf`.
///
/// Returns the parsed value together with the number of bytes consumed, or
/// `None` when the buffer holds only a prefix of the reply.
pub fn parse_reply(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    parse_at(buf, 0)
}

fn parse_at(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::ProtocolError(format!(
            "maximum nesting depth exceeded: {}",
            MAX_NESTING_DEPTH
        )));
    }

    match buf[0] {
        prefix::SIMPLE_STRING => {
            parse_line(buf).map(|r| r.map(|(s, n)| (RespValue::SimpleString(s), n)))
        }
        prefix::ERROR => parse_line(buf).map(|r| r.map(|(s, n)| (RespValue::Error(s), n))),
        prefix::INTEGER => match parse_line(buf)? {
            Some((s, n)) => {
                let value: i64 = s
                    .parse()
                    .map_err(|_| ParseError::InvalidInteger(s.clone()))?;
                Ok(Some((RespValue::Integer(value), n)))
            }
            None => Ok(None),
        },
        prefix::BULK_STRING => parse_bulk(buf),
        prefix::ARRAY => parse_array(buf, depth),
        other => Err(ParseError::UnknownPrefix(other)),
    }
}

/// Parses a `<prefix><line>\r\n` frame, returning the line and bytes used.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let content = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            // prefix + line + CRLF
            Ok(Some((content.to_string(), 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Parses a bulk string: `$<length>\r\n<data>\r\n` (null: `$-1\r\n`).
fn parse_bulk(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let (length, header_len) = match parse_length(buf)? {
        Some(v) => v,
        None => return Ok(None),
    };

    if length == -1 {
        return Ok(Some((RespValue::Null, header_len)));
    }
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::ReplyTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header_len + length + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header_len + length..total] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
    Ok(Some((RespValue::BulkString(data), total)))
}

/// Parses an array: `*<count>\r\n<elements...>` (null: `*-1\r\n`).
fn parse_array(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    let (count, header_len) = match parse_length(buf)? {
        Some(v) => v,
        None => return Ok(None),
    };

    if count == -1 {
        return Ok(Some((RespValue::Null, header_len)));
    }
    if count < 0 {
        return Err(ParseError::InvalidArrayLength(count));
    }

    let count = count as usize;
    let mut elements = Vec::with_capacity(count);
    let mut consumed = header_len;

    for _ in 0..count {
        if consumed >= buf.len() {
            return Ok(None);
        }
        match parse_at(&buf[consumed..], depth + 1)? {
            Some((value, used)) => {
                elements.push(value);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(elements), consumed)))
}

/// Parses the `<prefix><signed length>\r\n` header shared by `$` and `*`.
fn parse_length(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            let length: i64 = s
                .parse()
                .map_err(|_| ParseError::InvalidInteger(s.to_string()))?;
            Ok(Some((length, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Finds the position of CRLF in the buffer, relative to its start.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    for i in 0..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
    }
    None
}
