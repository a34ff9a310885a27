//! Error taxonomy of the harness.
//!
//! Channel drops are never errors. Everything here is fatal: it ends the run
//! and travels back out through the codec as an `anyhow::Error`, from which
//! the original value can be recovered with `downcast_ref`.

use thiserror::Error;

use crate::peer::Role;

/// A delivered payload failed verification, or a payload could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("payload length {length} is outside [8, u32::MAX]")]
    InvalidLength { length: usize },
    #[error("frame of {len} bytes is shorter than the 8-byte payload header")]
    TooShort { len: usize },
    #[error("payload {id}: declared length {declared} but frame has {actual} bytes")]
    LengthMismatch { id: u32, declared: u32, actual: usize },
    #[error("payload {id}: byte {offset} is {actual:#04x}, expected {expected:#04x}")]
    PayloadCorruption {
        id: u32,
        offset: usize,
        expected: u8,
        actual: u8,
    },
}

/// Failures of the harness itself or of the codec's callback contract.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("integrity violation: {0}")]
    Oracle(#[from] OracleError),
    #[error("{role} received an unexpected out-of-band frame ({len} bytes)")]
    UnexpectedOob { role: Role, len: usize },
    #[error("sender received an application payload ({len} bytes)")]
    UnexpectedPacket { len: usize },
    #[error("simulation stepped before setup")]
    NotSetUp,
    #[error("simulation is already running")]
    AlreadyRunning,
    #[error("feedback did not settle after {rounds} rounds")]
    FeedbackStorm { rounds: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
