// Run configuration for driver loops.
//
// Every field has a default so a JSON file only needs to name what it changes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::controller::ControllerParams;
use crate::error::{Error, Result};
use crate::region::{ParameterRanges, RegionTopology};
use crate::sparse_coder::{ExecutionTier, LearningRates};

fn default_seed() -> u64 {
    1
}

fn default_steps() -> usize {
    5_000
}

fn default_report_every() -> usize {
    500
}

/// Sparse coder sizing and learning settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CoderConfig {
    pub num_visible: usize,
    pub num_hidden: usize,
    pub rates: LearningRates,
    pub tier: ExecutionTier,
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            num_visible: 16,
            num_hidden: 32,
            rates: LearningRates::default(),
            tier: ExecutionTier::Scalar,
        }
    }
}

impl CoderConfig {
    /// Create a config with the given layer sizes and default rates.
    pub fn with_size(num_visible: usize, num_hidden: usize) -> Self {
        Self {
            num_visible,
            num_hidden,
            ..Default::default()
        }
    }

    pub fn with_rates(mut self, rates: LearningRates) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_tier(mut self, tier: ExecutionTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_visible == 0 {
            return Err(Error::InvalidDimensions {
                what: "num_visible",
                value: 0,
            });
        }
        if self.num_hidden == 0 {
            return Err(Error::InvalidDimensions {
                what: "num_hidden",
                value: 0,
            });
        }
        self.rates.validate()
    }
}

/// Controller region geometry and per-step hyperparameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ControlConfig {
    pub topology: RegionTopology,
    pub ranges: ParameterRanges,
    pub params: ControllerParams,
}

impl Default for ControlConfig {
    fn default() -> Self {
        // Error, position and one action slot.
        Self {
            topology: RegionTopology::with_input(3, 1),
            ranges: ParameterRanges::default(),
            params: ControllerParams::default(),
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.topology.input_len() == 0 {
            return Err(Error::InvalidDimensions {
                what: "region input size",
                value: 0,
            });
        }
        self.params.validate()
    }
}

/// Top-level config for the demo driver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunConfig {
    #[cfg_attr(feature = "serde", serde(default = "default_seed"))]
    pub seed: u64,
    #[cfg_attr(feature = "serde", serde(default = "default_steps"))]
    pub steps: usize,
    /// Print a progress line every N steps; 0 disables.
    #[cfg_attr(feature = "serde", serde(default = "default_report_every"))]
    pub report_every: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    pub coder: CoderConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub control: ControlConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            steps: default_steps(),
            report_every: default_report_every(),
            coder: CoderConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.coder.validate()?;
        self.control.validate()
    }

    /// Parse and validate a JSON config.
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "serde")]
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }
}
