//! # zeroloss-transport
//!
//! The codec boundary exercised by the zeroloss harness, plus two reference
//! codecs that implement it.
//!
//! A codec turns application payloads into wire frames on one side and wire
//! frames back into payloads on the other. The harness owns the channel and
//! the clock; the codec only reacts to `send`, `receive`, and `tick`.
//!
//! ## Crate structure
//!
//! - [`interface`]: `Transport` / `TransportHandler` traits and `Settings`
//! - [`passthrough`]: Degenerate codec: one payload, one frame, no recovery
//! - [`parity`]: Hybrid XOR-parity FEC + NACK ARQ codec
//! - [`wire`]: Datagram format of the parity codec
//! - [`codec`]: Single-parity group encoder/decoder
//! - [`arq`]: Sequence tracking and retransmit buffering
//! - [`stats`]: Codec counters and EWMA smoothing

pub mod arq;
pub mod codec;
pub mod interface;
pub mod parity;
pub mod passthrough;
pub mod stats;
pub mod wire;

pub use interface::{Settings, SettingsError, Transport, TransportError, TransportHandler};
pub use parity::ParityTransport;
pub use passthrough::PassThrough;
