//! Simulation configuration.
//!
//! [`SimConfig::default`] is the reference experiment. Embedders and tests can
//! also describe a run in TOML; every key is optional and falls back to the
//! reference value.
//!
//! ```toml
//! seed = 0
//! tick_interval_ms = 10
//! payloads_per_tick = 1
//! loss_rate = 0.4375
//!
//! [settings]
//! target_loss = 0.0001
//! max_data_size = 1350
//! ```

use std::time::Duration;

use serde::Deserialize;
use zeroloss_transport::Settings;

use crate::channel::LossRate;
use crate::error::HarnessError;
use crate::oracle::HEADER_LEN;

/// Tick interval of the reference run.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);
/// Tick interval of the slow preset.
pub const SLOW_TICK_INTERVAL: Duration = Duration::from_millis(150);

// ─── Resolved Config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Seed of the shared generator (loss decisions and payload lengths).
    pub seed: u64,
    /// Sleep between ticks in [`Simulation::run`](crate::driver::Simulation::run).
    pub tick_interval: Duration,
    /// Payloads the sender builds per tick.
    pub payloads_per_tick: u32,
    /// Drop probability of the Sender→Receiver direction.
    pub loss_rate: LossRate,
    /// Handed to both codecs at setup.
    pub settings: Settings,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            seed: 0,
            tick_interval: DEFAULT_TICK_INTERVAL,
            payloads_per_tick: 1,
            loss_rate: LossRate::REFERENCE,
            settings: Settings::default(),
        }
    }
}

impl SimConfig {
    /// Reference run at a pace a human can follow.
    pub fn slow() -> Self {
        SimConfig {
            tick_interval: SLOW_TICK_INTERVAL,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.settings.max_data_size < HEADER_LEN {
            return Err(HarnessError::InvalidConfig(format!(
                "max_data_size {} cannot hold the {HEADER_LEN}-byte payload header",
                self.settings.max_data_size
            )));
        }
        if u32::try_from(self.settings.max_data_size).is_err() {
            return Err(HarnessError::InvalidConfig(format!(
                "max_data_size {} does not fit the 32-bit length field",
                self.settings.max_data_size
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(input: &str) -> Result<Self, HarnessError> {
        if input.trim().is_empty() {
            return Ok(SimConfig::default());
        }
        let parsed: SimConfigInput = toml::from_str(input)
            .map_err(|e| HarnessError::InvalidConfig(format!("invalid config TOML: {e}")))?;
        parsed.resolve()
    }
}

// ─── TOML Input ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfigInput {
    pub seed: Option<u64>,
    pub tick_interval_ms: Option<u64>,
    pub payloads_per_tick: Option<u32>,
    pub loss_rate: Option<f64>,
    pub settings: SettingsInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsInput {
    pub target_loss: Option<f64>,
    pub min_loss: Option<f64>,
    pub max_loss: Option<f64>,
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_data_size: Option<usize>,
}

impl SimConfigInput {
    pub fn resolve(self) -> Result<SimConfig, HarnessError> {
        let base = SimConfig::default();
        let defaults = base.settings.clone();
        let s = self.settings;

        let settings = Settings {
            target_loss: s.target_loss.unwrap_or(defaults.target_loss),
            min_loss: s.min_loss.unwrap_or(defaults.min_loss),
            max_loss: s.max_loss.unwrap_or(defaults.max_loss),
            min_delay: s
                .min_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_delay),
            max_delay: s
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            max_data_size: s.max_data_size.unwrap_or(defaults.max_data_size),
        };

        let loss_rate = match self.loss_rate {
            Some(p) => LossRate::new(p)?,
            None => base.loss_rate,
        };

        let config = SimConfig {
            seed: self.seed.unwrap_or(base.seed),
            tick_interval: self
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(base.tick_interval),
            payloads_per_tick: self.payloads_per_tick.unwrap_or(base.payloads_per_tick),
            loss_rate,
            settings,
        };
        config.validate()?;
        Ok(config)
    }
}
