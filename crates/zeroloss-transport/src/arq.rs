//! # ARQ: Automatic Repeat reQuest
//!
//! Receiver side: [`SequenceTracker`] records which sequences have been
//! delivered and lists the gaps below the highest one seen.
//!
//! Sender side: [`RetransmitBuffer`] keeps every payload until a cumulative
//! ACK passes it, so any NACKed sequence can be sent again.
//!
//! The reverse path in the harness is lossless, so NACKs are simply repeated
//! every tick while a gap persists; there is no rearm timer or retry budget.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};

// ─── Sequence Tracker (Receiver-Side) ───────────────────────────────────────

/// Tracks delivered sequence numbers.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    /// Every sequence below this has been delivered.
    next_expected: u64,
    /// Delivered sequences at or above `next_expected`.
    above: BTreeSet<u64>,
    /// Highest sequence delivered so far.
    highest: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivered sequence. Returns `false` if it was already known.
    pub fn record(&mut self, seq: u64) -> bool {
        if self.is_received(seq) {
            return false;
        }
        self.highest = Some(self.highest.map_or(seq, |h| h.max(seq)));
        if seq == self.next_expected {
            self.next_expected += 1;
            while self.above.remove(&self.next_expected) {
                self.next_expected += 1;
            }
        } else {
            self.above.insert(seq);
        }
        true
    }

    pub fn is_received(&self, seq: u64) -> bool {
        seq < self.next_expected || self.above.contains(&seq)
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn highest(&self) -> Option<u64> {
        self.highest
    }

    /// Up to `limit` missing sequences below the highest delivered, oldest first.
    pub fn missing(&self, limit: usize) -> Vec<u64> {
        let Some(&ceiling) = self.above.iter().next_back() else {
            return Vec::new();
        };
        (self.next_expected..ceiling)
            .filter(|seq| !self.above.contains(seq))
            .take(limit)
            .collect()
    }
}

// ─── Retransmit Buffer (Sender-Side) ────────────────────────────────────────

/// Payloads awaiting cumulative acknowledgement.
#[derive(Debug, Default)]
pub struct RetransmitBuffer {
    frames: BTreeMap<u64, Bytes>,
}

impl RetransmitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, seq: u64, payload: Bytes) {
        self.frames.insert(seq, payload);
    }

    pub fn get(&self, seq: u64) -> Option<&Bytes> {
        self.frames.get(&seq)
    }

    /// Highest unacknowledged sequence and its payload.
    pub fn last(&self) -> Option<(u64, &Bytes)> {
        self.frames.iter().next_back().map(|(&seq, p)| (seq, p))
    }

    /// Release everything below `next_expected`. Returns how many were freed.
    pub fn ack_below(&mut self, next_expected: u64) -> usize {
        let kept = self.frames.split_off(&next_expected);
        let freed = self.frames.len();
        self.frames = kept;
        freed
    }

    /// Number of unacknowledged payloads.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
