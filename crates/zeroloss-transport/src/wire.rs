//! # Parity Codec Wire Format
//!
//! Every datagram starts with a 1-byte type. Integers are big-endian.
//!
//! ```text
//! Data    | 0x01 | flags (1) | seq (u64) | payload ...
//! Repair  | 0x02 | first_seq (u64) | count (u8) | len_xor (u16) | parity ...
//! Ack     | 0x03 | next_expected (u64) | loss_permille (u16)
//! Nack    | 0x04 | n (u16) | seq (u64) × n
//! Oob     | 0x05 | payload ...
//! ```
//!
//! Data flag bit 0 marks a retransmission. Decoding never panics; anything
//! that does not parse yields `None`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Largest payload a Data or Repair datagram can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Data header: type + flags + seq.
pub const DATA_HEADER_LEN: usize = 1 + 1 + 8;

/// Upper bound on sequences carried by one NACK.
pub const MAX_NACK_BATCH: usize = 256;

const TYPE_DATA: u8 = 0x01;
const TYPE_REPAIR: u8 = 0x02;
const TYPE_ACK: u8 = 0x03;
const TYPE_NACK: u8 = 0x04;
const TYPE_OOB: u8 = 0x05;

const FLAG_RETRANSMIT: u8 = 0x01;

// ─── Datagram Bodies ─────────────────────────────────────────────────────────

/// An application payload with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub seq: u64,
    pub retransmit: bool,
    pub payload: Bytes,
}

/// XOR parity over `count` consecutive source payloads starting at `first_seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairFrame {
    pub first_seq: u64,
    pub count: u8,
    /// XOR of the source payload lengths.
    pub len_xor: u16,
    /// XOR of the source payloads, each zero-padded to the longest.
    pub parity: Bytes,
}

impl RepairFrame {
    /// One past the last sequence covered.
    pub fn end_seq(&self) -> u64 {
        self.first_seq + u64::from(self.count)
    }

    pub fn covers(&self, seq: u64) -> bool {
        (self.first_seq..self.end_seq()).contains(&seq)
    }
}

/// Cumulative acknowledgement plus the receiver's loss estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    /// Every sequence below this has been delivered.
    pub next_expected: u64,
    /// Smoothed channel loss seen by the receiver, in 1/1000.
    pub loss_permille: u16,
}

/// Sequences the receiver is still missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackFrame {
    pub seqs: Vec<u64>,
}

// ─── Datagram ────────────────────────────────────────────────────────────────

/// A decoded parity-codec datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    Data(DataFrame),
    Repair(RepairFrame),
    Ack(AckFrame),
    Nack(NackFrame),
    Oob(Bytes),
}

impl Datagram {
    /// Serialize into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        match self {
            Datagram::Data(d) => {
                buf.put_u8(TYPE_DATA);
                buf.put_u8(if d.retransmit { FLAG_RETRANSMIT } else { 0 });
                buf.put_u64(d.seq);
                buf.extend_from_slice(&d.payload);
            }
            Datagram::Repair(r) => {
                buf.put_u8(TYPE_REPAIR);
                buf.put_u64(r.first_seq);
                buf.put_u8(r.count);
                buf.put_u16(r.len_xor);
                buf.extend_from_slice(&r.parity);
            }
            Datagram::Ack(a) => {
                buf.put_u8(TYPE_ACK);
                buf.put_u64(a.next_expected);
                buf.put_u16(a.loss_permille);
            }
            Datagram::Nack(n) => {
                let seqs = &n.seqs[..n.seqs.len().min(MAX_NACK_BATCH)];
                buf.put_u8(TYPE_NACK);
                buf.put_u16(seqs.len() as u16);
                for &seq in seqs {
                    buf.put_u64(seq);
                }
            }
            Datagram::Oob(payload) => {
                buf.put_u8(TYPE_OOB);
                buf.extend_from_slice(payload);
            }
        }
        buf.freeze()
    }

    /// Exact encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Datagram::Data(d) => DATA_HEADER_LEN + d.payload.len(),
            Datagram::Repair(r) => 1 + 8 + 1 + 2 + r.parity.len(),
            Datagram::Ack(_) => 1 + 8 + 2,
            Datagram::Nack(n) => 1 + 2 + 8 * n.seqs.len().min(MAX_NACK_BATCH),
            Datagram::Oob(p) => 1 + p.len(),
        }
    }

    /// Parse a datagram. Returns `None` on truncation, unknown type, or
    /// trailing garbage in fixed-size datagrams.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let mut buf = Bytes::copy_from_slice(raw);
        if !buf.has_remaining() {
            return None;
        }
        match buf.get_u8() {
            TYPE_DATA => {
                if buf.remaining() < 9 {
                    return None;
                }
                let flags = buf.get_u8();
                let seq = buf.get_u64();
                Some(Datagram::Data(DataFrame {
                    seq,
                    retransmit: flags & FLAG_RETRANSMIT != 0,
                    payload: buf,
                }))
            }
            TYPE_REPAIR => {
                if buf.remaining() < 11 {
                    return None;
                }
                let first_seq = buf.get_u64();
                let count = buf.get_u8();
                let len_xor = buf.get_u16();
                if count == 0 {
                    return None;
                }
                Some(Datagram::Repair(RepairFrame {
                    first_seq,
                    count,
                    len_xor,
                    parity: buf,
                }))
            }
            TYPE_ACK => {
                if buf.remaining() != 10 {
                    return None;
                }
                Some(Datagram::Ack(AckFrame {
                    next_expected: buf.get_u64(),
                    loss_permille: buf.get_u16(),
                }))
            }
            TYPE_NACK => {
                if buf.remaining() < 2 {
                    return None;
                }
                let n = buf.get_u16() as usize;
                if n > MAX_NACK_BATCH || buf.remaining() != n * 8 {
                    return None;
                }
                let seqs = (0..n).map(|_| buf.get_u64()).collect();
                Some(Datagram::Nack(NackFrame { seqs }))
            }
            TYPE_OOB => Some(Datagram::Oob(buf)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_layout_is_type_flags_seq_payload() {
        let dg = Datagram::Data(DataFrame {
            seq: 0x0102,
            retransmit: true,
            payload: Bytes::from_static(b"abc"),
        });
        let bytes = dg.encode();
        assert_eq!(bytes.len(), dg.encoded_len());
        assert_eq!(&bytes[..], &[1, 1, 0, 0, 0, 0, 0, 0, 1, 2, b'a', b'b', b'c']);
        assert_eq!(Datagram::decode(&bytes), Some(dg));
    }

    #[test]
    fn empty_and_unknown_are_rejected() {
        assert_eq!(Datagram::decode(&[]), None);
        assert_eq!(Datagram::decode(&[0x7F, 1, 2, 3]), None);
    }

    #[test]
    fn truncated_headers_are_rejected() {
        assert_eq!(Datagram::decode(&[TYPE_DATA, 0, 0, 0]), None);
        assert_eq!(Datagram::decode(&[TYPE_REPAIR, 0, 0]), None);
        assert_eq!(Datagram::decode(&[TYPE_ACK, 0, 0, 0, 0, 0, 0, 0, 0, 0]), None);
        assert_eq!(Datagram::decode(&[TYPE_NACK, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1]), None);
    }

    #[test]
    fn repair_with_zero_count_is_rejected() {
        let mut raw = vec![TYPE_REPAIR];
        raw.extend_from_slice(&7u64.to_be_bytes());
        raw.push(0);
        raw.extend_from_slice(&0u16.to_be_bytes());
        assert_eq!(Datagram::decode(&raw), None);
    }

    #[test]
    fn nack_encoding_is_capped() {
        let dg = Datagram::Nack(NackFrame {
            seqs: (0..(MAX_NACK_BATCH as u64 + 10)).collect(),
        });
        let bytes = dg.encode();
        assert_eq!(bytes.len(), 3 + 8 * MAX_NACK_BATCH);
        match Datagram::decode(&bytes) {
            Some(Datagram::Nack(n)) => assert_eq!(n.seqs.len(), MAX_NACK_BATCH),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn repair_coverage() {
        let r = RepairFrame {
            first_seq: 10,
            count: 3,
            len_xor: 0,
            parity: Bytes::new(),
        };
        assert_eq!(r.end_seq(), 13);
        assert!(!r.covers(9));
        assert!(r.covers(10) && r.covers(12));
        assert!(!r.covers(13));
    }
}
