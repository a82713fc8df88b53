//! The Region collaborator as seen by the controller.
//!
//! A region owns all structural state (columns, cells, receptive fields) and
//! all credit-assignment machinery. The controller only needs the five
//! capabilities below; any type implementing [`Region`] can be driven by
//! [`crate::controller::Controller`].

use core::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::prng::RandomSource;

/// Grid geometry handed to `Region::create_random`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegionTopology {
    pub input_width: usize,
    pub input_height: usize,
    pub columns_width: usize,
    pub columns_height: usize,
    pub cells_per_column: usize,
    pub receptive_radius: usize,
    pub cell_radius: usize,
}

impl Default for RegionTopology {
    fn default() -> Self {
        Self {
            input_width: 4,
            input_height: 1,
            columns_width: 8,
            columns_height: 1,
            cells_per_column: 4,
            receptive_radius: 2,
            cell_radius: 2,
        }
    }
}

impl RegionTopology {
    /// A `width x height` input grid with default column geometry.
    pub fn with_input(input_width: usize, input_height: usize) -> Self {
        Self {
            input_width,
            input_height,
            ..Default::default()
        }
    }

    /// Number of scalar inputs (and predicted action entries).
    pub fn input_len(&self) -> usize {
        self.input_width * self.input_height
    }

    pub fn column_count(&self) -> usize {
        self.columns_width * self.columns_height
    }
}

/// Initialization ranges for a freshly built region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParameterRanges {
    pub center: Range<f32>,
    pub width: Range<f32>,
    pub input_weight: Range<f32>,
    pub recon_weight: Range<f32>,
    pub cell_weight: Range<f32>,
    pub output_weight: Range<f32>,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            center: 0.0..1.0,
            width: 0.5..1.0,
            input_weight: -0.1..0.1,
            recon_weight: -0.1..0.1,
            cell_weight: -0.1..0.1,
            output_weight: -0.1..0.1,
        }
    }
}

/// Hyperparameters for `Region::get_output`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OutputParams {
    pub inhibition_radius: usize,
    pub local_activity: f32,
    pub column_intensity: f32,
    pub cell_intensity: f32,
    pub prediction_intensity: f32,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            inhibition_radius: 3,
            local_activity: 0.25,
            column_intensity: 4.0,
            cell_intensity: 4.0,
            prediction_intensity: 4.0,
        }
    }
}

/// Hyperparameters for `Region::learn_traces`, except the per-output vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TraceParams {
    pub recon_alpha: f32,
    pub center_alpha: f32,
    pub width_alpha: f32,
    pub width_scalar: f32,
    pub min_distance: f32,
    pub min_learning_threshold: f32,
    /// Cell-level learning rate. The controller gates this per step.
    pub cell_alpha: f32,
    pub prediction_intensity: f32,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            recon_alpha: 0.05,
            center_alpha: 0.05,
            width_alpha: 0.01,
            width_scalar: 1.0,
            min_distance: 0.01,
            min_learning_threshold: 0.0,
            cell_alpha: 0.05,
            prediction_intensity: 4.0,
        }
    }
}

/// Capability interface of a hierarchical perception/prediction region.
pub trait Region {
    /// Build column/cell structure from a topology and initialization ranges.
    fn create_random<R: RandomSource + ?Sized>(
        topology: &RegionTopology,
        ranges: &ParameterRanges,
        depth: usize,
        rng: &mut R,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Length of the input vector (and predicted action vector) this region expects.
    fn input_len(&self) -> usize;

    /// Advance to a new processing tick.
    fn step_begin(&mut self);

    /// Consume `input` and write the value estimate into `output[0]`.
    fn get_output<R: RandomSource + ?Sized>(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        mask: Option<&[bool]>,
        params: &OutputParams,
        rng: &mut R,
    ) -> Result<()>;

    /// Write the region's current predicted action into `action`.
    fn get_prediction(&self, action: &mut [f32]) -> Result<()>;

    /// Trace-based credit assignment.
    ///
    /// `action` is the learning target, `output` the value prediction and
    /// `error` the per-output error; `weight_alphas` and `output_lambdas` carry
    /// one rate and one trace decay per output.
    #[allow(clippy::too_many_arguments)]
    fn learn_traces(
        &mut self,
        action: &[f32],
        output: &[f32],
        mask: Option<&[bool]>,
        error: &[f32],
        weight_alphas: &[f32],
        params: &TraceParams,
        output_lambdas: &[f32],
    ) -> Result<()>;
}
