//! # Transport Statistics
//!
//! Counters kept by both codecs, serializable for JSON export.

use serde::Serialize;

/// Per-instance codec counters. One instance plays both halves, so a sender
/// only moves the send-side fields and a receiver the receive-side ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    /// Application payloads accepted by `send`.
    pub payloads_sent: u64,
    /// Original payload bytes accepted by `send`.
    pub bytes_sent: u64,
    /// Datagrams handed to `send_raw` (data, repair, control).
    pub frames_sent: u64,
    /// Data datagrams sent again in response to a NACK.
    pub retransmissions: u64,
    /// Parity repair datagrams sent.
    pub repairs_sent: u64,
    /// Datagrams passed to `receive`.
    pub frames_received: u64,
    /// Datagrams that failed to decode.
    pub malformed: u64,
    /// Payloads handed to `on_packet`.
    pub payloads_delivered: u64,
    /// Payloads rebuilt from parity instead of arriving directly.
    pub fec_recoveries: u64,
    /// Data datagrams for already delivered sequences.
    pub duplicates: u64,
    /// ACK datagrams sent.
    pub acks_sent: u64,
    /// NACK datagrams sent.
    pub nacks_sent: u64,
    /// Calls to `tick`.
    pub ticks: u64,
}

impl TransportStats {
    /// Retransmitted datagrams per sent payload.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.payloads_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.payloads_sent as f64
        }
    }

    /// Share of deliveries that came from parity recovery.
    pub fn recovery_ratio(&self) -> f64 {
        if self.payloads_delivered == 0 {
            0.0
        } else {
            self.fec_recoveries as f64 / self.payloads_delivered as f64
        }
    }
}

// ─── EWMA ───────────────────────────────────────────────────────────────────

/// Exponentially weighted moving average.
#[derive(Debug, Clone)]
pub struct Ewma {
    /// Smoothing factor in [0, 1]; higher reacts faster.
    alpha: f64,
    value: f64,
    initialized: bool,
}

impl Ewma {
    pub fn new(alpha: f64) -> Self {
        Ewma {
            alpha: alpha.clamp(0.0, 1.0),
            value: 0.0,
            initialized: false,
        }
    }

    /// Fold in a sample and return the smoothed value. The first sample is
    /// taken as-is.
    pub fn update(&mut self, sample: f64) -> f64 {
        if self.initialized {
            self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        } else {
            self.value = sample;
            self.initialized = true;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_are_zero_without_traffic() {
        let stats = TransportStats::default();
        assert_eq!(stats.retransmit_ratio(), 0.0);
        assert_eq!(stats.recovery_ratio(), 0.0);
    }

    #[test]
    fn ratios() {
        let stats = TransportStats {
            payloads_sent: 200,
            retransmissions: 50,
            payloads_delivered: 100,
            fec_recoveries: 25,
            ..Default::default()
        };
        assert!((stats.retransmit_ratio() - 0.25).abs() < 1e-9);
        assert!((stats.recovery_ratio() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn stats_serialize_to_json() {
        let stats = TransportStats {
            payloads_sent: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["payloads_sent"], 3);
        assert_eq!(json["fec_recoveries"], 0);
    }

    #[test]
    fn ewma_first_sample_then_smoothing() {
        let mut e = Ewma::new(0.5);
        assert_eq!(e.value(), 0.0);
        assert_eq!(e.update(10.0), 10.0);
        assert_eq!(e.update(20.0), 15.0);
        assert_eq!(e.value(), 15.0);
    }

    #[test]
    fn ewma_clamps_alpha() {
        let mut e = Ewma::new(7.0);
        e.update(1.0);
        assert_eq!(e.update(3.0), 3.0);
    }
}
