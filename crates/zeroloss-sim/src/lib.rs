//! # zeroloss-sim
//!
//! Deterministic loss-injection harness for delivery codecs.
//!
//! A sender peer emits synthetic payloads whose bytes follow from their
//! identifier; they cross a seeded lossy channel into a receiver peer that
//! re-derives and checks every byte. Control traffic flows back losslessly.
//! Any integrity violation ends the run.
//!
//! ## Crate structure
//!
//! - [`oracle`]: Payload generation and verification
//! - [`channel`]: Seeded Bernoulli loss on the Sender→Receiver link
//! - [`peer`]: Sender and receiver roles and their callback handlers
//! - [`driver`]: Tick loop and state machine
//! - [`config`]: Run parameters, TOML input layer
//! - [`stats`]: Per-tick delivery report
//! - [`error`]: Oracle and harness errors

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod oracle;
pub mod peer;
pub mod stats;

pub use channel::{LossChannel, LossRate, Verdict};
pub use config::SimConfig;
pub use driver::{DriverState, Simulation};
pub use error::{HarnessError, OracleError};
pub use stats::DeliveryReport;
