//! # Parity Transport: Hybrid FEC + ARQ
//!
//! Reference codec for the harness. One instance carries both halves, the
//! way a real endpoint would; which half is active depends only on the
//! traffic it sees.
//!
//! ## Sender half
//!
//! 1. **Sequencing**: every payload gets the next `u64` sequence number
//! 2. **Parity**: payloads are fed to a [`ParityEncoder`]; each closed group
//!    yields one repair datagram
//! 3. **Retransmit buffer**: payloads stay buffered until a cumulative ACK
//!    passes them; NACKed sequences are sent again immediately
//! 4. **Adaptation**: the group size follows the loss reported in ACKs
//! 5. **Tail probe**: after a few idle ticks with payloads still unacked, the
//!    newest one is sent again so the receiver can see the gap behind it
//!
//! ## Receiver half
//!
//! 1. **De-duplication**: each sequence is delivered exactly once
//! 2. **Recovery**: a single missing payload per group is rebuilt from parity
//! 3. **Feedback**: every tick emits an ACK (cumulative + smoothed loss) and,
//!    while gaps exist, a NACK listing them
//!
//! Delivery is immediate on arrival; no reordering buffer is kept.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::arq::{RetransmitBuffer, SequenceTracker};
use crate::codec::{ParityDecoder, ParityEncoder};
use crate::interface::{Settings, Transport, TransportError, TransportHandler};
use crate::stats::{Ewma, TransportStats};
use crate::wire::{AckFrame, DataFrame, Datagram, MAX_NACK_BATCH, NackFrame, RepairFrame};

/// Smallest parity group used while repairs are enabled.
pub const MIN_GROUP: usize = 2;
/// Largest parity group used while repairs are enabled.
pub const MAX_GROUP: usize = 16;
/// Ticks after which a partially filled group is closed anyway.
pub const MAX_GROUP_AGE_TICKS: u32 = 2;
/// Idle ticks with unacked payloads before the newest one is re-sent.
pub const TAIL_PROBE_TICKS: u32 = 4;
/// Sources kept below the cumulative ACK point for late repairs.
const DECODER_RETAIN: u64 = 64;
/// Smoothing for the receiver-side loss estimate.
const LOSS_ALPHA: f64 = 0.1;

/// Parity group size for an observed channel loss.
///
/// Repairs are disabled once loss is at or below `target_loss`; otherwise
/// the loss is clamped to `[min_loss, max_loss]` and one repair is planned
/// per `1 / loss` sources.
pub fn group_size_for(loss: f64, settings: &Settings) -> usize {
    if loss <= settings.target_loss {
        return 0;
    }
    let clamped = loss.clamp(settings.min_loss, settings.max_loss);
    if clamped <= 0.0 {
        return MAX_GROUP;
    }
    ((1.0 / clamped).round() as usize).clamp(MIN_GROUP, MAX_GROUP)
}

// ─── Parity Transport ───────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ParityTransport {
    settings: Option<Settings>,
    stats: TransportStats,

    // Sender half
    next_seq: u64,
    encoder: ParityEncoder,
    unacked: RetransmitBuffer,
    peer_loss: Option<f64>,
    idle_ticks: u32,

    // Receiver half
    tracker: SequenceTracker,
    decoder: ParityDecoder,
    loss: Ewma,
    originals_this_tick: u64,
    highest_at_last_tick: Option<u64>,
}

impl Default for ParityTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ParityTransport {
    pub fn new() -> Self {
        ParityTransport {
            settings: None,
            stats: TransportStats::default(),
            next_seq: 0,
            encoder: ParityEncoder::new(0),
            unacked: RetransmitBuffer::new(),
            peer_loss: None,
            idle_ticks: 0,
            tracker: SequenceTracker::new(),
            decoder: ParityDecoder::new(),
            loss: Ewma::new(LOSS_ALPHA),
            originals_this_tick: 0,
            highest_at_last_tick: None,
        }
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Current parity group size (0 = repairs disabled).
    pub fn group_size(&self) -> usize {
        self.encoder.group_size()
    }

    /// Loss most recently reported by the peer's ACKs.
    pub fn peer_loss(&self) -> Option<f64> {
        self.peer_loss
    }

    /// Smoothed channel loss observed on the receive side.
    pub fn observed_loss(&self) -> f64 {
        self.loss.value()
    }

    /// Payloads sent but not yet covered by a cumulative ACK.
    pub fn unacked(&self) -> usize {
        self.unacked.len()
    }

    /// Sequences below which everything has been delivered.
    pub fn delivered_floor(&self) -> u64 {
        self.tracker.next_expected()
    }

    /// Send an out-of-band payload that surfaces at the peer's `on_oob`.
    pub fn send_oob(&mut self, payload: &[u8], io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        self.settings()?;
        self.emit(&Datagram::Oob(Bytes::copy_from_slice(payload)), io)
    }

    fn settings(&self) -> Result<&Settings, TransportError> {
        self.settings.as_ref().ok_or(TransportError::NotInitialized)
    }

    fn emit(&mut self, datagram: &Datagram, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        self.stats.frames_sent += 1;
        io.send_raw(&datagram.encode())
    }

    fn emit_repair(&mut self, repair: RepairFrame, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        trace!(
            first_seq = repair.first_seq,
            count = repair.count,
            "sending parity repair"
        );
        self.stats.repairs_sent += 1;
        self.emit(&Datagram::Repair(repair), io)
    }

    // ─── Receive Paths ──────────────────────────────────────────────────

    fn on_data(&mut self, frame: DataFrame, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        if !frame.retransmit {
            self.originals_this_tick += 1;
        }
        if !self.tracker.record(frame.seq) {
            self.stats.duplicates += 1;
            return Ok(());
        }
        let tracker = &self.tracker;
        let recovered = self
            .decoder
            .add_source(frame.seq, frame.payload.clone(), |s| tracker.is_received(s));

        self.deliver(&frame.payload, io)?;
        if let Some((seq, payload)) = recovered {
            self.deliver_recovered(seq, &payload, io)?;
        }
        Ok(())
    }

    fn on_repair(&mut self, repair: RepairFrame, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        let tracker = &self.tracker;
        if let Some((seq, payload)) = self.decoder.add_repair(repair, |s| tracker.is_received(s)) {
            self.deliver_recovered(seq, &payload, io)?;
        }
        Ok(())
    }

    fn deliver_recovered(
        &mut self,
        seq: u64,
        payload: &[u8],
        io: &mut dyn TransportHandler,
    ) -> anyhow::Result<()> {
        if !self.tracker.record(seq) {
            return Ok(());
        }
        debug!(seq, len = payload.len(), "recovered payload from parity");
        self.stats.fec_recoveries += 1;
        self.deliver(payload, io)
    }

    fn deliver(&mut self, payload: &[u8], io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        self.stats.payloads_delivered += 1;
        io.on_packet(payload)
    }

    fn on_ack(&mut self, ack: AckFrame) -> anyhow::Result<()> {
        let freed = self.unacked.ack_below(ack.next_expected);
        let loss = f64::from(ack.loss_permille) / 1000.0;
        self.peer_loss = Some(loss);

        let group = group_size_for(loss, self.settings()?);
        if group != self.encoder.group_size() {
            debug!(loss, group, "adapting parity group size");
        }
        self.encoder.set_group_size(group);
        trace!(next_expected = ack.next_expected, freed, "ack processed");
        Ok(())
    }

    fn on_nack(&mut self, nack: NackFrame, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        for seq in nack.seqs {
            let Some(payload) = self.unacked.get(seq).cloned() else {
                // Already acknowledged, or never sent by this side.
                continue;
            };
            self.retransmit(seq, payload, io)?;
        }
        Ok(())
    }

    fn retransmit(
        &mut self,
        seq: u64,
        payload: Bytes,
        io: &mut dyn TransportHandler,
    ) -> anyhow::Result<()> {
        self.stats.retransmissions += 1;
        let frame = Datagram::Data(DataFrame {
            seq,
            retransmit: true,
            payload,
        });
        self.emit(&frame, io)
    }

    // ─── Tick Paths ─────────────────────────────────────────────────────

    fn tick_sender(&mut self, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        if let Some(repair) = self.encoder.tick(MAX_GROUP_AGE_TICKS) {
            self.emit_repair(repair, io)?;
        }
        if self.unacked.is_empty() {
            self.idle_ticks = 0;
            return Ok(());
        }
        self.idle_ticks += 1;
        if self.idle_ticks >= TAIL_PROBE_TICKS {
            self.idle_ticks = 0;
            if let Some((seq, payload)) = self.unacked.last().map(|(s, p)| (s, p.clone())) {
                trace!(seq, "tail probe");
                self.retransmit(seq, payload, io)?;
            }
        }
        Ok(())
    }

    fn tick_receiver(&mut self, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        let Some(highest) = self.tracker.highest() else {
            return Ok(());
        };

        let expected = match self.highest_at_last_tick {
            Some(prev) => highest.saturating_sub(prev),
            None => highest + 1,
        };
        if expected > 0 {
            let arrived = self.originals_this_tick.min(expected);
            let sample = 1.0 - arrived as f64 / expected as f64;
            self.loss.update(sample);
        }
        self.highest_at_last_tick = Some(highest);
        self.originals_this_tick = 0;

        let ack = AckFrame {
            next_expected: self.tracker.next_expected(),
            loss_permille: (self.loss.value() * 1000.0).round().clamp(0.0, 1000.0) as u16,
        };
        self.stats.acks_sent += 1;
        self.emit(&Datagram::Ack(ack), io)?;

        let missing = self.tracker.missing(MAX_NACK_BATCH);
        if !missing.is_empty() {
            trace!(count = missing.len(), first = missing[0], "sending nack");
            self.stats.nacks_sent += 1;
            self.emit(&Datagram::Nack(NackFrame { seqs: missing }), io)?;
        }

        self.decoder
            .retire(self.tracker.next_expected(), DECODER_RETAIN);
        Ok(())
    }
}

impl Transport for ParityTransport {
    fn initialize(&mut self, settings: Settings) -> anyhow::Result<()> {
        if self.settings.is_some() {
            return Err(TransportError::AlreadyInitialized.into());
        }
        settings.validate().map_err(TransportError::from)?;
        // Until the peer reports otherwise, plan for the worst tolerated loss.
        self.encoder = ParityEncoder::new(group_size_for(settings.max_loss, &settings));
        self.settings = Some(settings);
        Ok(())
    }

    fn send(&mut self, payload: &[u8], io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        let max = self.settings()?.max_data_size;
        if payload.len() > max {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max,
            }
            .into());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.idle_ticks = 0;
        let payload = Bytes::copy_from_slice(payload);
        self.unacked.insert(seq, payload.clone());
        self.stats.payloads_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;

        let repair = self.encoder.add_source(seq, &payload);
        self.emit(
            &Datagram::Data(DataFrame {
                seq,
                retransmit: false,
                payload,
            }),
            io,
        )?;
        if let Some(repair) = repair {
            self.emit_repair(repair, io)?;
        }
        Ok(())
    }

    fn receive(&mut self, raw: &[u8], io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        self.settings()?;
        self.stats.frames_received += 1;
        let Some(datagram) = Datagram::decode(raw) else {
            self.stats.malformed += 1;
            warn!(len = raw.len(), "dropping malformed datagram");
            return Ok(());
        };
        match datagram {
            Datagram::Data(frame) => self.on_data(frame, io),
            Datagram::Repair(repair) => self.on_repair(repair, io),
            Datagram::Ack(ack) => self.on_ack(ack),
            Datagram::Nack(nack) => self.on_nack(nack, io),
            Datagram::Oob(payload) => io.on_oob(&payload),
        }
    }

    fn tick(&mut self, io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        self.settings()?;
        self.stats.ticks += 1;
        trace!(
            tick = self.stats.ticks,
            retransmit_ratio = self.stats.retransmit_ratio(),
            recovery_ratio = self.stats.recovery_ratio(),
            "codec tick"
        );
        self.tick_sender(io)?;
        self.tick_receiver(io)
    }
}
