//! # Payload Oracle
//!
//! Synthetic payloads whose entire content follows from their identifier, so
//! the receiving side can prove byte-exact delivery without the sender
//! retaining a copy or shipping a checksum.
//!
//! ```text
//! 0        4        8                              length
//! ┌────────┬────────┬──────────────────────────────┐
//! │ id LE  │ len LE │ body_stream(id) ...          │
//! └────────┴────────┴──────────────────────────────┘
//! ```
//!
//! The header is a convention of the harness only. Codecs treat the whole
//! payload as opaque bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::OracleError;

/// Identifier + declared length.
pub const HEADER_LEN: usize = 8;

/// The parsed 8-byte payload header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub id: u32,
    pub length: u32,
}

impl PayloadHeader {
    /// Read the header from the first 8 bytes of `frame`.
    pub fn parse(frame: &[u8]) -> Result<Self, OracleError> {
        if frame.len() < HEADER_LEN {
            return Err(OracleError::TooShort { len: frame.len() });
        }
        let mut buf = frame;
        Ok(PayloadHeader {
            id: buf.get_u32_le(),
            length: buf.get_u32_le(),
        })
    }
}

/// Body bytes for payload `id`: one byte per `next_u32` draw of a generator
/// seeded with the identifier.
pub fn body_stream(id: u32) -> impl Iterator<Item = u8> {
    let mut rng = StdRng::seed_from_u64(u64::from(id));
    std::iter::repeat_with(move || rng.next_u32() as u8)
}

/// Build the payload for `id`, exactly `length` bytes long.
pub fn generate(id: u32, length: usize) -> Result<Bytes, OracleError> {
    let declared = u32::try_from(length)
        .ok()
        .filter(|_| length >= HEADER_LEN)
        .ok_or(OracleError::InvalidLength { length })?;

    let mut buf = BytesMut::with_capacity(length);
    buf.put_u32_le(id);
    buf.put_u32_le(declared);
    buf.extend(body_stream(id).take(length - HEADER_LEN));
    Ok(buf.freeze())
}

/// Check a delivered frame against the payload its header claims to be.
///
/// The length field is checked before any body byte, so a truncated or padded
/// frame is always a `LengthMismatch`, never a `PayloadCorruption`.
pub fn verify(frame: &[u8]) -> Result<PayloadHeader, OracleError> {
    let header = PayloadHeader::parse(frame)?;
    if frame.len() != header.length as usize {
        return Err(OracleError::LengthMismatch {
            id: header.id,
            declared: header.length,
            actual: frame.len(),
        });
    }

    let body = &frame[HEADER_LEN..];
    for (i, (&actual, expected)) in body.iter().zip(body_stream(header.id)).enumerate() {
        if actual != expected {
            return Err(OracleError::PayloadCorruption {
                id: header.id,
                offset: HEADER_LEN + i,
                expected,
                actual,
            });
        }
    }
    Ok(header)
}
