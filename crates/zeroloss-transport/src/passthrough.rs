//! # Pass-Through Codec
//!
//! The degenerate collaborator: no framing, no redundancy, no feedback. Each
//! payload becomes exactly one frame and each received frame is delivered
//! as-is. Whatever the channel drops is lost, which makes this codec a probe
//! for the harness plumbing alone.

use tracing::trace;

use crate::interface::{Settings, Transport, TransportError, TransportHandler};
use crate::stats::TransportStats;

#[derive(Debug, Default)]
pub struct PassThrough {
    settings: Option<Settings>,
    stats: TransportStats,
}

impl PassThrough {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn settings(&self) -> Result<&Settings, TransportError> {
        self.settings.as_ref().ok_or(TransportError::NotInitialized)
    }
}

impl Transport for PassThrough {
    fn initialize(&mut self, settings: Settings) -> anyhow::Result<()> {
        if self.settings.is_some() {
            return Err(TransportError::AlreadyInitialized.into());
        }
        settings.validate().map_err(TransportError::from)?;
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
        self.stats.payloads_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        self.stats.frames_sent += 1;
        trace!(len = payload.len(), "pass-through send");
        io.send_raw(payload)
    }

    fn receive(&mut self, raw: &[u8], io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        self.settings()?;
        self.stats.frames_received += 1;
        self.stats.payloads_delivered += 1;
        io.on_packet(raw)
    }

    fn tick(&mut self, _io: &mut dyn TransportHandler) -> anyhow::Result<()> {
        self.settings()?;
        self.stats.ticks += 1;
        Ok(())
    }
}
