//! # FEC Codec: Single-Parity Groups
//!
//! Systematic XOR parity: source payloads go out unencoded, and after every
//! `k` of them the encoder emits one repair datagram holding the XOR of the
//! group (payloads zero-padded to the longest) and the XOR of their lengths.
//! The decoder rebuilds any one missing payload of a group from the repair
//! and the other `k - 1` payloads.
//!
//! Groups are disjoint runs of consecutive sequence numbers, so a recovery
//! never enables another one. The group size may change between groups;
//! a change requested mid-group applies from the next group on.

use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::warn;

use crate::wire::RepairFrame;

/// Largest group a repair datagram can describe.
pub const MAX_GROUP_SIZE: usize = u8::MAX as usize;

// ─── Encoder ────────────────────────────────────────────────────────────────

/// Accumulates source payloads into parity groups.
#[derive(Debug)]
pub struct ParityEncoder {
    /// Group size in effect; 0 disables repair emission.
    group_size: usize,
    /// Group size to switch to at the next group boundary.
    pending_size: usize,
    first_seq: u64,
    count: usize,
    len_xor: u16,
    parity: Vec<u8>,
    /// Ticks since the current group received its first payload.
    age: u32,
}

impl ParityEncoder {
    pub fn new(group_size: usize) -> Self {
        let group_size = group_size.min(MAX_GROUP_SIZE);
        ParityEncoder {
            group_size,
            pending_size: group_size,
            first_seq: 0,
            count: 0,
            len_xor: 0,
            parity: Vec::new(),
            age: 0,
        }
    }

    /// Current group size (0 = repairs disabled).
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Number of payloads in the open group.
    pub fn buffered(&self) -> usize {
        self.count
    }

    /// Request a new group size. Applied once the open group is closed.
    pub fn set_group_size(&mut self, group_size: usize) {
        self.pending_size = group_size.min(MAX_GROUP_SIZE);
        if self.count == 0 {
            self.group_size = self.pending_size;
        }
    }

    /// Add the next source payload. Returns a repair when this closes a group.
    ///
    /// Sequences must be fed contiguously; a gap abandons the open group.
    pub fn add_source(&mut self, seq: u64, payload: &[u8]) -> Option<RepairFrame> {
        if self.group_size == 0 {
            return None;
        }
        if self.count > 0 && self.first_seq + self.count as u64 != seq {
            warn!(
                expected = self.first_seq + self.count as u64,
                seq, "non-contiguous source, abandoning open parity group"
            );
            self.reset();
        }
        if self.count == 0 {
            self.first_seq = seq;
            self.age = 0;
        }

        if payload.len() > self.parity.len() {
            self.parity.resize(payload.len(), 0);
        }
        for (p, &b) in self.parity.iter_mut().zip(payload) {
            *p ^= b;
        }
        self.len_xor ^= payload.len() as u16;
        self.count += 1;

        if self.count >= self.group_size {
            return self.close();
        }
        None
    }

    /// Age the open group by one tick; closes it once it reaches `max_age`.
    pub fn tick(&mut self, max_age: u32) -> Option<RepairFrame> {
        if self.count == 0 {
            return None;
        }
        self.age += 1;
        if self.age >= max_age {
            self.close()
        } else {
            None
        }
    }

    fn close(&mut self) -> Option<RepairFrame> {
        if self.count == 0 {
            return None;
        }
        let repair = RepairFrame {
            first_seq: self.first_seq,
            count: self.count as u8,
            len_xor: self.len_xor,
            parity: Bytes::from(std::mem::take(&mut self.parity)),
        };
        self.reset();
        Some(repair)
    }

    fn reset(&mut self) {
        self.parity.clear();
        self.count = 0;
        self.len_xor = 0;
        self.age = 0;
        self.group_size = self.pending_size;
    }
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Holds recent source payloads and unresolved repairs.
#[derive(Debug, Default)]
pub struct ParityDecoder {
    sources: BTreeMap<u64, Bytes>,
    /// Unresolved repairs keyed by `first_seq`.
    repairs: BTreeMap<u64, RepairFrame>,
}

impl ParityDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly received source payload. Returns a payload recovered
    /// from the repair covering `seq`, if that repair just became solvable.
    ///
    /// `delivered` reports sequences the caller already holds, including
    /// ones this decoder has since retired.
    pub fn add_source(
        &mut self,
        seq: u64,
        payload: Bytes,
        delivered: impl Fn(u64) -> bool,
    ) -> Option<(u64, Bytes)> {
        self.sources.insert(seq, payload);
        let first = self
            .repairs
            .range(..=seq)
            .next_back()
            .filter(|(_, r)| r.covers(seq))
            .map(|(&first, _)| first)?;
        self.resolve(first, &delivered)
    }

    /// Record a repair. Returns the payload it recovers, if any.
    pub fn add_repair(
        &mut self,
        repair: RepairFrame,
        delivered: impl Fn(u64) -> bool,
    ) -> Option<(u64, Bytes)> {
        let first = repair.first_seq;
        self.repairs.insert(first, repair);
        self.resolve(first, &delivered)
    }

    /// Drop state that can no longer help. Repairs whose whole group lies
    /// below `floor` are resolved; sources below `floor - retain` are no
    /// longer needed by any repair that may still arrive.
    pub fn retire(&mut self, floor: u64, retain: u64) {
        self.repairs.retain(|_, r| r.end_seq() > floor);
        let keep_from = self
            .repairs
            .keys()
            .next()
            .copied()
            .unwrap_or(u64::MAX)
            .min(floor.saturating_sub(retain));
        self.sources = self.sources.split_off(&keep_from);
    }

    pub fn pending_repairs(&self) -> usize {
        self.repairs.len()
    }

    pub fn buffered_sources(&self) -> usize {
        self.sources.len()
    }

    fn resolve(&mut self, first: u64, delivered: &impl Fn(u64) -> bool) -> Option<(u64, Bytes)> {
        let repair = self.repairs.get(&first)?;

        let mut missing = None;
        let mut unknown = 0usize;
        for seq in repair.first_seq..repair.end_seq() {
            if self.sources.contains_key(&seq) {
                continue;
            }
            if delivered(seq) {
                // Held by the caller but retired here: cannot contribute.
                return None;
            }
            unknown += 1;
            missing = Some(seq);
        }

        match (unknown, missing) {
            (0, _) => {
                self.repairs.remove(&first);
                None
            }
            (1, Some(seq)) => {
                let repair = self.repairs.remove(&first)?;
                let payload = self.rebuild(&repair, seq)?;
                self.sources.insert(seq, payload.clone());
                Some((seq, payload))
            }
            _ => None,
        }
    }

    fn rebuild(&self, repair: &RepairFrame, missing: u64) -> Option<Bytes> {
        let mut data = repair.parity.to_vec();
        let mut len = repair.len_xor;
        for seq in repair.first_seq..repair.end_seq() {
            if seq == missing {
                continue;
            }
            let src = self.sources.get(&seq)?;
            if src.len() > data.len() {
                warn!(seq, "source longer than its parity, dropping repair");
                return None;
            }
            for (d, &b) in data.iter_mut().zip(src.iter()) {
                *d ^= b;
            }
            len ^= src.len() as u16;
        }
        let len = len as usize;
        if len > data.len() {
            warn!(missing, len, "recovered length exceeds parity, dropping repair");
            return None;
        }
        data.truncate(len);
        Some(Bytes::from(data))
    }
}
