//! RESP Command Parser
//!
//! Decodes client requests, which are always RESP arrays of bulk strings:
//!
//! ```text
//! *<count>\r\n
//! $<len>\r\n<len bytes>\r\n      (repeated count times)
//! ```
//!
//! ## How the Parser Works
//!
//! The parser looks at the front of an accumulated receive buffer and returns:
//! - `Ok(Some((command, consumed)))` - a full command; `consumed` bytes belong to it
//! - `Ok(None)` - the command is not complete yet, wait for more bytes
//! - `Err(ParseError)` - the bytes can never become a valid command
//!
//! Decoding is all-or-nothing: no partial command is ever returned. The caller
//! advances its buffer by `consumed` and keeps any trailing bytes for the next
//! call, so pipelined commands and commands split across reads both work.

use crate::protocol::command::Command;
use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A type sigil other than the one the grammar requires at this point
    #[error("expected '{expected}', found {found:#04x}")]
    UnexpectedByte { expected: char, found: u8 },

    /// Array count or bulk length is not a non-negative decimal integer
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// A bulk string larger than the parser accepts
    #[error("bulk string too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Decodes RESP arrays of bulk strings into [`Command`]s.
#[derive(Debug, Clone)]
pub struct RespParser {
    max_bulk_size: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default bulk size limit.
    pub fn new() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
        }
    }

    /// Creates a parser that rejects bulk strings longer than `max_bulk_size`.
    pub fn with_max_bulk_size(max_bulk_size: usize) -> Self {
        Self { max_bulk_size }
    }

    /// Attempts to decode one command from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }
        expect_sigil(buf[0], prefix::ARRAY)?;

        let (count, mut pos) = match read_length(buf, 1)? {
            Some(v) => v,
            None => return Ok(None),
        };

        // The count comes from the client, so don't trust it for allocation.
        let mut args = Vec::with_capacity(count.min(64));

        for _ in 0..count {
            match self.parse_bulk_string(buf, pos)? {
                Some((arg, next)) => {
                    args.push(arg);
                    pos = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((Command::new(args), pos)))
    }

    /// Parses `$<len>\r\n<data>\r\n` starting at `pos`, returning the data
    /// and the position just past it.
    fn parse_bulk_string(&self, buf: &[u8], pos: usize) -> ParseResult<Option<(Bytes, usize)>> {
        let Some(&sigil) = buf.get(pos) else {
            return Ok(None);
        };
        expect_sigil(sigil, prefix::BULK_STRING)?;

        let (length, data_start) = match read_length(buf, pos + 1)? {
            Some(v) => v,
            None => return Ok(None),
        };

        if length > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_size,
            });
        }

        let data_end = data_start + length;
        if buf.len() < data_end + CRLF.len() {
            return Ok(None);
        }

        if &buf[data_end..data_end + CRLF.len()] != CRLF {
            return Err(ParseError::MissingCrlf);
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((data, data_end + CRLF.len())))
    }
}

#[inline]
fn expect_sigil(found: u8, expected: u8) -> ParseResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(ParseError::UnexpectedByte {
            expected: expected as char,
            found,
        })
    }
}

/// Reads a CRLF-terminated non-negative decimal starting at `pos`.
///
/// Returns the value and the position just past the CRLF.
fn read_length(buf: &[u8], pos: usize) -> ParseResult<Option<(usize, usize)>> {
    let rest = buf.get(pos..).unwrap_or_default();
    let Some(end) = find_crlf(rest) else {
        return Ok(None);
    };

    let digits = &rest[..end];
    let invalid = || ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned());
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let length = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(invalid)?;

    Ok(Some((length, pos + end + CRLF.len())))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Returns how many leading bytes to drop after a malformed message so that
/// the buffer starts at the next plausible array header (`*` at the start of
/// a line). Returns `buf.len()` when there is none.
pub fn resync_offset(buf: &[u8]) -> usize {
    buf.windows(3)
        .skip(1)
        .position(|w| w[..2] == *CRLF && w[2] == prefix::ARRAY)
        .map(|i| i + 1 + CRLF.len())
        .unwrap_or(buf.len())
}

/// Decodes a single command from `buf` with the default parser.
pub fn parse_command(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    RespParser::new().parse(buf)
}
