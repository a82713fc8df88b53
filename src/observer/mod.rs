#[cfg(feature = "serde")]
use serde::Serialize;

use crate::controller::{Controller, StepReport};
use crate::region::Region;
use crate::sparse_coder::SparseCoder;

/// A read-only snapshot of what a sparse coder is doing.
///
/// Design intent:
/// - Observers cannot mutate or steer the coder.
/// - Snapshotting is *on-demand*; the hot loop stays unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CoderSnapshot {
    pub num_visible: usize,
    pub num_hidden: usize,
    pub active_units: usize,
    pub mean_state: f32,
    pub mean_bias: f32,
    /// Mean over off-diagonal lateral weights.
    pub mean_lateral_weight: f32,
    pub reconstruction_error: f32,
}

pub struct CoderAdapter<'a> {
    coder: &'a SparseCoder,
}

impl<'a> CoderAdapter<'a> {
    pub fn new(coder: &'a SparseCoder) -> Self {
        Self { coder }
    }

    pub fn snapshot(&self) -> CoderSnapshot {
        let c = self.coder;
        let nh = c.num_hidden();

        let hidden = c.hidden_units();
        let active_units = hidden.iter().filter(|h| h.state > 0.0).count();
        let mean_state = hidden.iter().map(|h| h.state).sum::<f32>() / nh as f32;
        let mean_bias = hidden.iter().map(|h| h.bias).sum::<f32>() / nh as f32;

        let off_diagonal = nh * nh - nh;
        let mean_lateral_weight = if off_diagonal == 0 {
            0.0
        } else {
            // Diagonal entries are always zero, so the full sum is the off-diagonal sum.
            (0..nh)
                .map(|hi| c.lateral_weights(hi).iter().sum::<f32>())
                .sum::<f32>()
                / off_diagonal as f32
        };

        CoderSnapshot {
            num_visible: c.num_visible(),
            num_hidden: nh,
            active_units,
            mean_state,
            mean_bias,
            mean_lateral_weight,
            reconstruction_error: c.reconstruction_error(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ControllerSnapshot {
    pub ticks: u64,
    pub input_len: usize,
    pub prev_value: f32,
    pub prev_prediction: Vec<f32>,
    pub last_report: Option<StepReport>,
}

pub struct ControllerAdapter<'a, G> {
    controller: &'a Controller<G>,
}

impl<'a, G: Region> ControllerAdapter<'a, G> {
    pub fn new(controller: &'a Controller<G>) -> Self {
        Self { controller }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let c = self.controller;
        ControllerSnapshot {
            ticks: c.ticks(),
            input_len: c.input_len(),
            prev_value: c.prev_value(),
            prev_prediction: c.prev_prediction().to_vec(),
            last_report: c.last_report().copied(),
        }
    }
}
