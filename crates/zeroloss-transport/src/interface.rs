//! # Transport Boundary
//!
//! The contract between the harness and a codec under test.
//!
//! The harness drives a codec through [`Transport`] and supplies a
//! [`TransportHandler`] on every call. The codec reports recovered payloads,
//! out-of-band frames, and frames it wants put on the wire back through that
//! handler, synchronously, before the call returns.
//!
//! ```text
//!   harness ──initialize/send/receive/tick──▶ Transport
//!   harness ◀──on_packet/on_oob/send_raw───── Transport
//! ```
//!
//! Errors returned by a handler are fatal for the harness and must be passed
//! straight back out of the `Transport` call that triggered them.

use std::time::Duration;
use thiserror::Error;

use crate::wire::MAX_PAYLOAD_LEN;

/// Link MTU-sized payload limit used by the reference scenario.
pub const DEFAULT_MAX_DATA_SIZE: usize = 1350;

// ─── Settings ───────────────────────────────────────────────────────────────

/// Codec parameters handed over once at initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Residual loss the codec should aim for after recovery.
    pub target_loss: f64,
    /// Lowest channel loss the codec should plan redundancy for.
    pub min_loss: f64,
    /// Highest channel loss the codec is expected to survive.
    pub max_loss: f64,
    /// Lower bound on tolerated delivery delay.
    pub min_delay: Duration,
    /// Upper bound on tolerated delivery delay.
    pub max_delay: Duration,
    /// Largest payload accepted by `send`, in bytes.
    pub max_data_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            target_loss: 0.0001,
            min_loss: 0.03,
            max_loss: 0.5,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(3000),
            max_data_size: DEFAULT_MAX_DATA_SIZE,
        }
    }
}

impl Settings {
    /// Check internal consistency. Codecs call this from `initialize`.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [
            ("target_loss", self.target_loss),
            ("min_loss", self.min_loss),
            ("max_loss", self.max_loss),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::LossOutOfRange { name, value });
            }
        }
        if self.min_loss > self.max_loss {
            return Err(SettingsError::LossBoundsInverted {
                min: self.min_loss,
                max: self.max_loss,
            });
        }
        if self.target_loss > self.max_loss {
            return Err(SettingsError::TargetAboveMax {
                target: self.target_loss,
                max: self.max_loss,
            });
        }
        if self.min_delay > self.max_delay {
            return Err(SettingsError::DelayBoundsInverted {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        if self.max_data_size == 0 {
            return Err(SettingsError::ZeroDataSize);
        }
        if self.max_data_size > MAX_PAYLOAD_LEN {
            return Err(SettingsError::DataSizeTooLarge {
                size: self.max_data_size,
                limit: MAX_PAYLOAD_LEN,
            });
        }
        Ok(())
    }
}

/// Rejected [`Settings`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{name} = {value} is outside [0, 1]")]
    LossOutOfRange { name: &'static str, value: f64 },
    #[error("min_loss {min} exceeds max_loss {max}")]
    LossBoundsInverted { min: f64, max: f64 },
    #[error("target_loss {target} exceeds max_loss {max}")]
    TargetAboveMax { target: f64, max: f64 },
    #[error("min_delay {min:?} exceeds max_delay {max:?}")]
    DelayBoundsInverted { min: Duration, max: Duration },
    #[error("max_data_size must be non-zero")]
    ZeroDataSize,
    #[error("max_data_size {size} exceeds the wire limit of {limit} bytes")]
    DataSizeTooLarge { size: usize, limit: usize },
}

/// Failures raised by a codec itself, as opposed to errors coming back from
/// the handler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("transport used before initialize")]
    NotInitialized,
    #[error("transport already initialized")]
    AlreadyInitialized,
    #[error("payload of {len} bytes exceeds max_data_size {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),
}

// ─── Callback Surface ───────────────────────────────────────────────────────

/// Callbacks a codec invokes while the harness is inside one of its calls.
pub trait TransportHandler {
    /// A payload was fully recovered. Order relative to `send` is not
    /// guaranteed.
    fn on_packet(&mut self, payload: &[u8]) -> anyhow::Result<()>;

    /// An out-of-band control payload surfaced.
    fn on_oob(&mut self, payload: &[u8]) -> anyhow::Result<()>;

    /// Put a frame on the wire toward the peer.
    fn send_raw(&mut self, frame: &[u8]) -> anyhow::Result<()>;
}

// ─── Codec ──────────────────────────────────────────────────────────────────

/// A forward-error-corrected delivery codec under test.
///
/// Every method is synchronous. Any handler error must be returned unchanged.
pub trait Transport {
    /// Accept settings. Must be called exactly once before anything else.
    fn initialize(&mut self, settings: Settings) -> anyhow::Result<()>;

    /// Submit an application payload for delivery.
    fn send(&mut self, payload: &[u8], io: &mut dyn TransportHandler) -> anyhow::Result<()>;

    /// Inject bytes that arrived off the wire.
    fn receive(&mut self, raw: &[u8], io: &mut dyn TransportHandler) -> anyhow::Result<()>;

    /// Advance internal clocks and emit any periodic traffic.
    fn tick(&mut self, io: &mut dyn TransportHandler) -> anyhow::Result<()>;
}
