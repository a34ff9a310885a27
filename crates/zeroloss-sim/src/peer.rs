//! # Peers
//!
//! The two ends of the simulated link. Each owns one codec instance and
//! answers its callbacks through a short-lived handler value built for the
//! duration of a single codec call:
//!
//! - [`SenderIo`]: `send_raw` goes through the lossy [`LossChannel`] and,
//!   when the frame survives, straight into the receiver's codec.
//! - [`ReceiverIo`]: `on_packet` runs the oracle; `send_raw` appends to the
//!   lossless feedback queue.
//!
//! Feedback is not delivered from inside the receiver's codec call, since
//! the sender's codec is usually still on the stack at that point. Instead
//! [`SenderPeer::settle`] drains the queue into the sender right after each
//! sender-side codec call returns, until nothing is left.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use rand::RngExt as _;
use rand::rngs::StdRng;
use tracing::{debug, trace};
use zeroloss_transport::{Settings, Transport, TransportHandler};

use crate::channel::LossChannel;
use crate::error::{HarnessError, OracleError};
use crate::oracle::{self, HEADER_LEN};

/// Upper bound on feedback frames handled by one [`SenderPeer::settle`].
pub const MAX_SETTLE_ROUNDS: usize = 100_000;

/// Lossless Receiver→Sender frames awaiting delivery, oldest first.
pub type Feedback = VecDeque<Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// What both peers have in common.
pub trait Endpoint {
    type Transport: Transport;

    fn role(&self) -> Role;

    fn transport(&self) -> &Self::Transport;

    /// Hand the codec its settings. Called once by the driver at setup.
    fn initialize(&mut self, settings: Settings) -> anyhow::Result<()>;
}

// ─── Sender ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SenderPeer<T> {
    transport: T,
    payloads_per_tick: u32,
    max_data_size: usize,
    next_id: u32,
    sent: u64,
}

impl<T: Transport> SenderPeer<T> {
    pub fn new(transport: T, payloads_per_tick: u32, max_data_size: usize) -> Self {
        SenderPeer {
            transport,
            payloads_per_tick,
            max_data_size,
            next_id: 0,
            sent: 0,
        }
    }

    /// Payloads handed to the codec so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Identifier the next payload will carry.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Identifier of the most recent payload, if any.
    pub fn last_id(&self) -> Option<u32> {
        (self.sent > 0).then(|| self.next_id.wrapping_sub(1))
    }

    /// Build and send this tick's payloads, then advance the codec.
    pub fn tick<R: Transport>(&mut self, io: &mut SenderIo<'_, R>) -> anyhow::Result<()> {
        for _ in 0..self.payloads_per_tick {
            let len = io.rng.random_range(HEADER_LEN..=self.max_data_size);
            let id = self.next_id;
            let payload = oracle::generate(id, len).map_err(HarnessError::from)?;
            // Identifiers wrap after 2^32 payloads.
            self.next_id = id.wrapping_add(1);
            self.sent += 1;

            debug!(id, len, "sending payload");
            self.transport.send(&payload, io)?;
            self.settle(io)?;
        }
        self.transport.tick(io)?;
        self.settle(io)?;
        Ok(())
    }

    /// Deliver queued feedback into the codec until the queue stays empty.
    /// Returns the number of frames delivered.
    pub fn settle<R: Transport>(&mut self, io: &mut SenderIo<'_, R>) -> anyhow::Result<usize> {
        let mut rounds = 0;
        while let Some(frame) = io.feedback.pop_front() {
            rounds += 1;
            if rounds > MAX_SETTLE_ROUNDS {
                return Err(HarnessError::FeedbackStorm { rounds: MAX_SETTLE_ROUNDS }.into());
            }
            trace!(len = frame.len(), "feedback to sender");
            self.transport.receive(&frame, io)?;
        }
        Ok(rounds)
    }
}

impl<T: Transport> Endpoint for SenderPeer<T> {
    type Transport = T;

    fn role(&self) -> Role {
        Role::Sender
    }

    fn transport(&self) -> &T {
        &self.transport
    }

    fn initialize(&mut self, settings: Settings) -> anyhow::Result<()> {
        self.max_data_size = settings.max_data_size;
        self.transport.initialize(settings)
    }
}

/// Sender-side callbacks for one codec call.
pub struct SenderIo<'a, R> {
    pub channel: &'a mut LossChannel,
    pub rng: &'a mut StdRng,
    pub receiver: &'a mut ReceiverPeer<R>,
    pub feedback: &'a mut Feedback,
}

impl<R: Transport> TransportHandler for SenderIo<'_, R> {
    fn on_packet(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        Err(HarnessError::UnexpectedPacket { len: payload.len() }.into())
    }

    fn on_oob(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        Err(HarnessError::UnexpectedOob {
            role: Role::Sender,
            len: payload.len(),
        }
        .into())
    }

    fn send_raw(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        if self.channel.maybe_deliver(frame, &mut *self.rng).is_delivered() {
            self.receiver.deliver_raw(frame, self.feedback)?;
        }
        Ok(())
    }
}

// ─── Receiver ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ReceiverPeer<T> {
    transport: T,
    received: u64,
}

impl<T: Transport> ReceiverPeer<T> {
    pub fn new(transport: T) -> Self {
        ReceiverPeer {
            transport,
            received: 0,
        }
    }

    /// Payloads verified so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Raw entry point of the channel: a frame that survived the link.
    pub fn deliver_raw(&mut self, frame: &[u8], feedback: &mut Feedback) -> anyhow::Result<()> {
        let mut io = ReceiverIo {
            received: &mut self.received,
            feedback,
        };
        self.transport.receive(frame, &mut io)
    }

    /// Advance the codec. Any feedback it emits is queued.
    pub fn tick(&mut self, feedback: &mut Feedback) -> anyhow::Result<()> {
        let mut io = ReceiverIo {
            received: &mut self.received,
            feedback,
        };
        self.transport.tick(&mut io)
    }
}

impl<T: Transport> Endpoint for ReceiverPeer<T> {
    type Transport = T;

    fn role(&self) -> Role {
        Role::Receiver
    }

    fn transport(&self) -> &T {
        &self.transport
    }

    fn initialize(&mut self, settings: Settings) -> anyhow::Result<()> {
        self.transport.initialize(settings)
    }
}

/// Receiver-side callbacks for one codec call.
pub struct ReceiverIo<'a> {
    received: &'a mut u64,
    feedback: &'a mut Feedback,
}

impl TransportHandler for ReceiverIo<'_> {
    fn on_packet(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        if payload.len() < HEADER_LEN {
            return Err(HarnessError::from(OracleError::TooShort { len: payload.len() }).into());
        }
        let header = oracle::verify(payload).map_err(HarnessError::from)?;
        *self.received += 1;
        debug!(id = header.id, len = header.length, "verified payload");
        Ok(())
    }

    fn on_oob(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        Err(HarnessError::UnexpectedOob {
            role: Role::Receiver,
            len: payload.len(),
        }
        .into())
    }

    fn send_raw(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        self.feedback.push_back(Bytes::copy_from_slice(frame));
        Ok(())
    }
}
