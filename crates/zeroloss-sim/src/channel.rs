//! # Loss-Injecting Channel
//!
//! Models the lossy Sender→Receiver link. Each frame costs exactly one
//! `next_u32` draw from the shared generator and is either dropped or passed
//! through untouched; there is no reordering, duplication, or corruption.
//!
//! The drop test compares the draw against `rate × 2³²`. For the reference
//! rate of 7/16 that is the same as asking whether the top four bits of the
//! draw are below 7.

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::HarnessError;

const SCALE: f64 = 4_294_967_296.0; // 2^32

// ─── Loss Rate ──────────────────────────────────────────────────────────────

/// A drop probability in `[0, 1]`, stored as a threshold on a 32-bit draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossRate {
    threshold: u64,
}

impl LossRate {
    /// Never drop.
    pub const NONE: LossRate = LossRate { threshold: 0 };
    /// Always drop.
    pub const ALL: LossRate = LossRate { threshold: 1 << 32 };
    /// 7/16 = 43.75%, the rate of the "4 bits below 7" reference link.
    pub const REFERENCE: LossRate = LossRate { threshold: 7 << 28 };

    pub fn new(probability: f64) -> Result<Self, HarnessError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(HarnessError::InvalidConfig(format!(
                "loss rate {probability} is outside [0, 1]"
            )));
        }
        Ok(LossRate {
            threshold: (probability * SCALE).round() as u64,
        })
    }

    /// `n / 16`, for `n` in `0..=16`.
    pub fn from_sixteenths(n: u8) -> Result<Self, HarnessError> {
        if n > 16 {
            return Err(HarnessError::InvalidConfig(format!(
                "loss rate {n}/16 exceeds 1"
            )));
        }
        Ok(LossRate {
            threshold: u64::from(n) << 28,
        })
    }

    pub fn probability(&self) -> f64 {
        self.threshold as f64 / SCALE
    }

    fn drops(&self, draw: u32) -> bool {
        u64::from(draw) < self.threshold
    }
}

impl Default for LossRate {
    fn default() -> Self {
        LossRate::REFERENCE
    }
}

// ─── Channel ────────────────────────────────────────────────────────────────

/// Outcome of offering one frame to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Delivered,
    Dropped,
}

impl Verdict {
    pub fn is_delivered(self) -> bool {
        self == Verdict::Delivered
    }
}

/// Cumulative channel counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub offered: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub bytes_delivered: u64,
}

impl ChannelStats {
    /// Observed drop rate so far.
    pub fn drop_rate(&self) -> f64 {
        if self.offered == 0 {
            0.0
        } else {
            self.dropped as f64 / self.offered as f64
        }
    }
}

#[derive(Debug)]
pub struct LossChannel {
    rate: LossRate,
    stats: ChannelStats,
}

impl LossChannel {
    pub fn new(rate: LossRate) -> Self {
        LossChannel {
            rate,
            stats: ChannelStats::default(),
        }
    }

    pub fn rate(&self) -> LossRate {
        self.rate
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Decide the fate of `frame` with one draw from `rng`. On `Delivered`
    /// the caller forwards the same bytes to the receiving peer.
    pub fn maybe_deliver<R: Rng + ?Sized>(&mut self, frame: &[u8], rng: &mut R) -> Verdict {
        let draw = rng.next_u32();
        self.stats.offered += 1;
        if self.rate.drops(draw) {
            self.stats.dropped += 1;
            debug!(len = frame.len(), "channel dropped frame");
            Verdict::Dropped
        } else {
            self.stats.delivered += 1;
            self.stats.bytes_delivered += frame.len() as u64;
            Verdict::Delivered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn reference_rate_is_seven_sixteenths() {
        assert_eq!(LossRate::REFERENCE, LossRate::from_sixteenths(7).unwrap());
        assert_eq!(LossRate::REFERENCE, LossRate::new(0.4375).unwrap());
        assert_eq!(LossRate::REFERENCE.probability(), 0.4375);
    }

    #[test]
    fn reference_threshold_matches_top_nibble_test() {
        for draw in [0u32, 0x6FFF_FFFF, 0x7000_0000, 0xFFFF_FFFF, 0x1234_5678] {
            assert_eq!(LossRate::REFERENCE.drops(draw), (draw >> 28) < 7);
        }
    }

    #[test]
    fn rejects_out_of_range_rates() {
        assert!(LossRate::new(-0.1).is_err());
        assert!(LossRate::new(1.01).is_err());
        assert!(LossRate::new(f64::NAN).is_err());
        assert!(LossRate::from_sixteenths(17).is_err());
        assert_eq!(LossRate::from_sixteenths(16).unwrap(), LossRate::ALL);
    }

    #[test]
    fn extremes_never_and_always_drop() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut none = LossChannel::new(LossRate::NONE);
        let mut all = LossChannel::new(LossRate::ALL);
        for _ in 0..1000 {
            assert_eq!(none.maybe_deliver(b"f", &mut rng), Verdict::Delivered);
            assert_eq!(all.maybe_deliver(b"f", &mut rng), Verdict::Dropped);
        }
        assert_eq!(none.stats().bytes_delivered, 1000);
        assert_eq!(all.stats().drop_rate(), 1.0);
    }

    #[test]
    fn observed_rate_converges() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut ch = LossChannel::new(LossRate::REFERENCE);
        for _ in 0..100_000 {
            ch.maybe_deliver(&[0u8; 16], &mut rng);
        }
        let stats = ch.stats();
        assert_eq!(stats.offered, 100_000);
        assert_eq!(stats.dropped + stats.delivered, stats.offered);
        assert!(
            (stats.drop_rate() - 0.4375).abs() < 0.01,
            "drop rate {} strays from 7/16",
            stats.drop_rate()
        );
    }

    #[test]
    fn same_seed_same_decisions() {
        let run = || {
            let mut rng = StdRng::seed_from_u64(99);
            let mut ch = LossChannel::new(LossRate::REFERENCE);
            (0..500)
                .map(|_| ch.maybe_deliver(b"x", &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
