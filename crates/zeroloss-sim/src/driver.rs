//! # Simulation Driver
//!
//! Owns both peers, the channel, the shared generator, and the feedback
//! queue, and advances them in a fixed order:
//!
//! ```text
//! step():
//!   receiver.tick  → settle feedback → report
//!   sender.tick    (send + settle per payload, codec tick + settle)
//! ```
//!
//! The receiver ticks first so that each report reflects the previous tick's
//! traffic before new payloads are added.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};
use zeroloss_transport::Transport;

use crate::channel::{ChannelStats, LossChannel};
use crate::config::SimConfig;
use crate::error::HarnessError;
use crate::peer::{Endpoint, Feedback, ReceiverPeer, Role, SenderIo, SenderPeer};
use crate::stats::DeliveryReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Running,
}

pub struct Simulation<T> {
    config: SimConfig,
    state: DriverState,
    tick: u64,
    rng: StdRng,
    channel: LossChannel,
    feedback: Feedback,
    sender: SenderPeer<T>,
    receiver: ReceiverPeer<T>,
}

impl<T: Transport> Simulation<T> {
    /// Build both peers with codecs from `factory`. Nothing is initialized
    /// until [`setup`](Self::setup).
    pub fn new(config: SimConfig, mut factory: impl FnMut(Role) -> T) -> Result<Self, HarnessError> {
        config.validate()?;
        let sender = SenderPeer::new(
            factory(Role::Sender),
            config.payloads_per_tick,
            config.settings.max_data_size,
        );
        let receiver = ReceiverPeer::new(factory(Role::Receiver));
        Ok(Simulation {
            rng: StdRng::seed_from_u64(config.seed),
            channel: LossChannel::new(config.loss_rate),
            feedback: Feedback::new(),
            state: DriverState::Uninitialized,
            tick: 0,
            sender,
            receiver,
            config,
        })
    }

    /// Initialize both codecs and start accepting [`step`](Self::step).
    pub fn setup(&mut self) -> anyhow::Result<()> {
        if self.state == DriverState::Running {
            return Err(HarnessError::AlreadyRunning.into());
        }
        debug!(peer = %self.receiver.role(), "initializing codec");
        self.receiver.initialize(self.config.settings.clone())?;
        debug!(peer = %self.sender.role(), "initializing codec");
        self.sender.initialize(self.config.settings.clone())?;
        self.state = DriverState::Running;
        info!(
            seed = self.config.seed,
            loss = self.channel.rate().probability(),
            payloads_per_tick = self.config.payloads_per_tick,
            "simulation running"
        );
        Ok(())
    }

    /// Advance one tick and return the report taken after the receiver tick.
    pub fn step(&mut self) -> anyhow::Result<DeliveryReport> {
        if self.state != DriverState::Running {
            return Err(HarnessError::NotSetUp.into());
        }
        self.tick += 1;

        self.receiver.tick(&mut self.feedback)?;
        let mut io = SenderIo {
            channel: &mut self.channel,
            rng: &mut self.rng,
            receiver: &mut self.receiver,
            feedback: &mut self.feedback,
        };
        self.sender.settle(&mut io)?;
        let report = DeliveryReport::new(self.tick, self.sender.sent(), io.receiver.received());

        self.sender.tick(&mut io)?;
        Ok(report)
    }

    /// Step `ticks` times back to back. Returns the last report, or the
    /// current counters when `ticks` is 0.
    pub fn run_for(&mut self, ticks: u64) -> anyhow::Result<DeliveryReport> {
        let mut report = self.report();
        for _ in 0..ticks {
            report = self.step()?;
        }
        Ok(report)
    }

    /// Step forever at the configured pace, logging one line per tick.
    /// Returns only with the error that stopped the run.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let interval = self.config.tick_interval;
        loop {
            sleep(interval);
            let report = self.step()?;
            info!(tick = report.tick, "{report}");
        }
    }

    /// Current counters without advancing.
    pub fn report(&self) -> DeliveryReport {
        DeliveryReport::new(self.tick, self.sent(), self.received())
    }

    pub fn sent(&self) -> u64 {
        self.sender.sent()
    }

    pub fn received(&self) -> u64 {
        self.receiver.received()
    }

    pub fn channel_stats(&self) -> &ChannelStats {
        self.channel.stats()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn sender(&self) -> &SenderPeer<T> {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiverPeer<T> {
        &self.receiver
    }
}

fn sleep(interval: Duration) {
    if !interval.is_zero() {
        std::thread::sleep(interval);
    }
}
