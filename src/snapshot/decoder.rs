//! Primitive decoders for the snapshot format.
//!
//! ## Size Encoding
//!
//! The top two bits of the leading byte select the form:
//!
//! ```text
//! 00xxxxxx                      6-bit size
//! 01xxxxxx yyyyyyyy             14-bit size
//! 10______ b0 b1 b2 b3          32-bit size, big-endian
//! 11xxxxxx                      special encoding (strings only)
//! ```
//!
//! ## String Encoding
//!
//! A string is a size followed by that many raw bytes, or one of the special
//! integer forms, which decode to the integer's decimal text:
//!
//! ```text
//! 0xC0 b0                       8-bit integer
//! 0xC1 b0 b1                    16-bit integer, little-endian
//! 0xC2 b0 b1 b2 b3              32-bit integer, little-endian
//! ```
//!
//! Integer forms are only accepted by [`SnapshotDecoder::read_string`], never
//! by [`SnapshotDecoder::read_size`].

use bytes::Bytes;
use thiserror::Error;

/// Length of the magic header: `REDIS` plus a four-digit version.
pub const HEADER_LEN: usize = 9;

/// Magic prefix every snapshot starts with.
pub const MAGIC: &[u8] = b"REDIS";

mod encoding {
    pub const SIZE_6BIT: u8 = 0b00;
    pub const SIZE_14BIT: u8 = 0b01;
    pub const SIZE_32BIT: u8 = 0b10;

    pub const INT8: u8 = 0xC0;
    pub const INT16: u8 = 0xC1;
    pub const INT32: u8 = 0xC2;
}

/// Errors raised while reading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid header: {0:?}")]
    InvalidHeader(String),

    #[error("unexpected end of data at offset {offset} ({needed} more bytes needed)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("invalid size encoding {byte:#04x} at offset {offset}")]
    InvalidSizeEncoding { byte: u8, offset: usize },

    #[error("unsupported string encoding {byte:#04x} at offset {offset}")]
    UnsupportedStringEncoding { byte: u8, offset: usize },

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("unsupported value type {value_type:#04x} at offset {offset}")]
    UnsupportedValueType { value_type: u8, offset: usize },

    #[error("snapshot ended without an end-of-file marker")]
    MissingEof,
}

/// Result type for snapshot decoding.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// A forward-only cursor over snapshot bytes.
#[derive(Debug)]
pub struct SnapshotDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns true once every byte has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> SnapshotResult<&'a [u8]> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(SnapshotError::UnexpectedEof {
                offset: self.pos,
                needed: n - available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> SnapshotResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> SnapshotResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> SnapshotResult<u64> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Reads and validates the magic header, returning the version digits.
    pub fn read_header(&mut self) -> SnapshotResult<&'a str> {
        let header = self
            .take(HEADER_LEN)
            .map_err(|_| SnapshotError::InvalidHeader("file too short".to_string()))?;

        let text = String::from_utf8_lossy(header);
        let invalid = || SnapshotError::InvalidHeader(text.to_string());

        let (magic, version) = header.split_at(MAGIC.len());
        if magic != MAGIC || !version.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        std::str::from_utf8(version).map_err(|_| invalid())
    }

    /// Reads a size field. Special (`11`) encodings are rejected.
    pub fn read_size(&mut self) -> SnapshotResult<usize> {
        let offset = self.pos;
        let first = self.read_u8()?;
        match self.read_size_tail(first)? {
            Some(size) => Ok(size),
            None => Err(SnapshotError::InvalidSizeEncoding {
                byte: first,
                offset,
            }),
        }
    }

    /// Decodes the size whose leading byte is `first`, or returns `None` for
    /// the special `11` tag.
    fn read_size_tail(&mut self, first: u8) -> SnapshotResult<Option<usize>> {
        let size = match first >> 6 {
            encoding::SIZE_6BIT => (first & 0x3F) as usize,
            encoding::SIZE_14BIT => {
                let next = self.read_u8()?;
                (((first & 0x3F) as usize) << 8) | next as usize
            }
            encoding::SIZE_32BIT => self.take_array().map(u32::from_be_bytes)? as usize,
            _ => return Ok(None),
        };
        Ok(Some(size))
    }

    /// Reads a string field, expanding integer encodings to decimal text.
    pub fn read_string(&mut self) -> SnapshotResult<Bytes> {
        let offset = self.pos;
        let first = self.read_u8()?;

        if let Some(len) = self.read_size_tail(first)? {
            return Ok(Bytes::copy_from_slice(self.take(len)?));
        }

        let value = match first {
            encoding::INT8 => i64::from(self.read_u8()? as i8),
            encoding::INT16 => i64::from(i16::from_le_bytes(self.take_array()?)),
            encoding::INT32 => i64::from(i32::from_le_bytes(self.take_array()?)),
            byte => return Err(SnapshotError::UnsupportedStringEncoding { byte, offset }),
        };
        Ok(Bytes::from(value.to_string()))
    }
}
