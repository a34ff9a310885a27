//! Delivery statistics reported once per tick.

use serde::Serialize;
use std::fmt;

/// Snapshot of the cumulative counters after a receiver tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub tick: u64,
    /// Payloads handed to the sender's codec so far.
    pub sent: u64,
    /// Payloads verified by the receiver so far.
    pub received: u64,
    /// `received / sent`, 0 before anything was sent.
    pub ratio: f64,
}

impl DeliveryReport {
    pub fn new(tick: u64, sent: u64, received: u64) -> Self {
        DeliveryReport {
            tick,
            sent,
            received,
            ratio: delivery_ratio(sent, received),
        }
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} : {:.6}", self.received, self.sent, self.ratio)
    }
}

pub fn delivery_ratio(sent: u64, received: u64) -> f64 {
    if sent == 0 {
        0.0
    } else {
        received as f64 / sent as f64
    }
}
