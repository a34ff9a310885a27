//! Soak run of the parity codec over the reference lossy link.
//!
//! Takes no arguments and reads no files or environment. Prints one delivery
//! line per tick until interrupted; exits non-zero on the first integrity
//! violation.

use anyhow::Result;
use tracing::error;
use zeroloss_sim::peer::Endpoint;
use zeroloss_sim::{SimConfig, Simulation};
use zeroloss_transport::ParityTransport;

fn main() -> Result<()> {
    let (config, filter) = if cfg!(feature = "slow") {
        (SimConfig::slow(), "debug")
    } else {
        (SimConfig::default(), "info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();

    let mut sim = Simulation::new(config, |_| ParityTransport::new())?;
    sim.setup()?;
    if let Err(e) = sim.run() {
        let (tx, rx) = (sim.sender().transport().stats(), sim.receiver().transport().stats());
        error!(
            tick = sim.report().tick,
            retransmit_ratio = tx.retransmit_ratio(),
            recovery_ratio = rx.recovery_ratio(),
            "simulation aborted: {e:#}"
        );
        return Err(e);
    }
    Ok(())
}
