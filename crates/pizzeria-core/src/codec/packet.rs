//! Growable byte buffer with checked, cursor-based reads.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Errors from packing, unpacking, or hex conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A read ran past the end of the buffer.
    #[error("not enough data to unpack {needed} bytes ({available} available)")]
    Truncated {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// Hex text must have an even number of digits.
    #[error("invalid hex string: length must be even")]
    OddHexLength,

    /// Hex text contained a non-hex character.
    #[error("invalid hex string: not a hex digit")]
    InvalidHexDigit,

    /// A packed enum field held a value outside the enum's range.
    #[error("invalid {field} value on the wire: {value}")]
    InvalidEnum {
        /// Which field failed to decode.
        field: &'static str,
        /// The offending wire value.
        value: u32,
    },
}

/// Append-only packed payload buffer.
///
/// Integers are packed little-endian at fixed width; byte runs are prefixed
/// with their `u32` length. Reading goes through [`Packet::reader`], which
/// fails with [`CodecError::Truncated`] instead of panicking on short input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    data: BytesMut,
}

impl Packet {
    /// Create an empty packet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap raw bytes, e.g. a blob extracted from another packet.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: BytesMut::from(&data[..]),
        }
    }

    /// Decode hex text into a packet.
    ///
    /// # Errors
    ///
    /// Fails on odd-length input or non-hex digits.
    pub fn from_hex(text: &str) -> Result<Self, CodecError> {
        let data = hex::decode(text).map_err(|e| match e {
            hex::FromHexError::OddLength => CodecError::OddHexLength,
            _ => CodecError::InvalidHexDigit,
        })?;
        Ok(Self::from_bytes(data))
    }

    /// Append a `u32`, little-endian.
    pub fn put_u32(&mut self, value: u32) {
        self.data.put_u32_le(value);
    }

    /// Append a `u64`, little-endian.
    pub fn put_u64(&mut self, value: u64) {
        self.data.put_u64_le(value);
    }

    /// Append a length-prefixed byte run.
    pub fn put_blob(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.data.put_slice(bytes);
    }

    /// The packed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowercase hex rendering, two digits per byte.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    /// A read cursor positioned at the start of the packet.
    #[must_use]
    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader {
            data: &self.data,
            offset: 0,
        }
    }
}

/// Checked read cursor over a [`Packet`].
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        let available = self.data.len() - self.offset;
        if count > available {
            return Err(CodecError::Truncated {
                needed: count,
                available,
            });
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    /// Read a little-endian `u32` and advance.
    ///
    /// # Errors
    ///
    /// Fails when fewer than four bytes remain.
    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian `u64` and advance.
    ///
    /// # Errors
    ///
    /// Fails when fewer than eight bytes remain.
    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Read a length-prefixed byte run and advance.
    ///
    /// # Errors
    ///
    /// Fails when the prefix or the run itself is truncated.
    pub fn get_blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let length = self.get_u32()? as usize;
        self.take(length).map(<[u8]>::to_vec)
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}
