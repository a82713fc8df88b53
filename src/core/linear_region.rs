// A minimal Region: one linear value readout with eligibility traces and one
// tanh policy readout. No columns, no cells; topology beyond the input size is
// ignored. It exists so the controller can be driven end to end.

use core::ops::Range;

use tracing::trace;

use crate::error::{check_len, Error, Result};
use crate::prng::RandomSource;
use crate::region::{OutputParams, ParameterRanges, Region, RegionTopology, TraceParams};

#[derive(Debug, Clone)]
pub struct LinearRegion {
    input_len: usize,

    value_weights: Vec<f32>,
    value_bias: f32,
    value_traces: Vec<f32>,
    bias_trace: f32,

    // Row k maps the input onto predicted action entry k.
    policy_weights: Vec<f32>,

    last_input: Vec<f32>,
    prediction: Vec<f32>,
    value: f32,

    ticks: u64,
}

impl LinearRegion {
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn value_weights(&self) -> &[f32] {
        &self.value_weights
    }

    pub fn policy_weights(&self) -> &[f32] {
        &self.policy_weights
    }

    /// Value estimate from the most recent `get_output`.
    pub fn last_value(&self) -> f32 {
        self.value
    }
}

fn draw_range<R: RandomSource + ?Sized>(rng: &mut R, range: &Range<f32>, n: usize) -> Vec<f32> {
    (0..n).map(|_| rng.uniform(range.start, range.end)).collect()
}

fn check_range(range: &Range<f32>, what: &'static str) -> Result<()> {
    if range.start.is_finite() && range.end.is_finite() && range.start <= range.end {
        Ok(())
    } else {
        Err(Error::InvalidParameter(what))
    }
}

impl Region for LinearRegion {
    fn create_random<R: RandomSource + ?Sized>(
        topology: &RegionTopology,
        ranges: &ParameterRanges,
        depth: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let n = topology.input_len();
        if n == 0 {
            return Err(Error::InvalidDimensions {
                what: "region input size",
                value: n,
            });
        }
        if depth == 0 {
            return Err(Error::InvalidDimensions {
                what: "region depth",
                value: depth,
            });
        }
        check_range(&ranges.input_weight, "input_weight range")?;
        check_range(&ranges.output_weight, "output_weight range")?;

        let value_weights = draw_range(rng, &ranges.input_weight, n);
        let policy_weights = draw_range(rng, &ranges.output_weight, n * n);

        Ok(Self {
            input_len: n,
            value_weights,
            value_bias: 0.0,
            value_traces: vec![0.0; n],
            bias_trace: 0.0,
            policy_weights,
            last_input: vec![0.0; n],
            prediction: vec![0.0; n],
            value: 0.0,
            ticks: 0,
        })
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn step_begin(&mut self) {
        self.ticks += 1;
    }

    fn get_output<R: RandomSource + ?Sized>(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        mask: Option<&[bool]>,
        params: &OutputParams,
        _rng: &mut R,
    ) -> Result<()> {
        check_len("region input", self.input_len, input.len())?;
        if output.is_empty() {
            return Err(Error::DimensionMismatch {
                what: "region output",
                expected: 1,
                actual: 0,
            });
        }
        if let Some(mask) = mask {
            check_len("region mask", self.input_len, mask.len())?;
        }

        // Masked entries are hidden from the region.
        for (i, (dst, &x)) in self.last_input.iter_mut().zip(input).enumerate() {
            let hidden = mask.is_some_and(|m| m[i]);
            *dst = if hidden { 0.0 } else { x };
        }

        let mut value = self.value_bias;
        for (w, x) in self.value_weights.iter().zip(&self.last_input) {
            value += w * x;
        }
        self.value = value;
        output[0] = value;

        let gain = params.prediction_intensity.max(0.0);
        for (p, row) in self
            .prediction
            .iter_mut()
            .zip(self.policy_weights.chunks_exact(self.input_len))
        {
            let mut sum = 0.0;
            for (w, x) in row.iter().zip(&self.last_input) {
                sum += w * x;
            }
            *p = (gain * sum).tanh();
        }

        Ok(())
    }

    fn get_prediction(&self, action: &mut [f32]) -> Result<()> {
        check_len("region prediction", self.input_len, action.len())?;
        action.copy_from_slice(&self.prediction);
        Ok(())
    }

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
    ) -> Result<()> {
        check_len("learning target", self.input_len, action.len())?;
        check_len("value output", 1, output.len())?;
        check_len("output error", 1, error.len())?;
        check_len("weight alphas", 1, weight_alphas.len())?;
        check_len("output lambdas", 1, output_lambdas.len())?;
        if let Some(mask) = mask {
            check_len("region mask", self.input_len, mask.len())?;
        }

        let delta = weight_alphas[0] * error[0];
        let lambda = output_lambdas[0];

        // The error scores the previous tick's value, so weights move along the
        // traces accumulated up to that tick before this tick's input joins them.
        for (i, (w, e)) in self
            .value_weights
            .iter_mut()
            .zip(self.value_traces.iter_mut())
            .enumerate()
        {
            if mask.is_some_and(|m| m[i]) {
                continue;
            }
            *w += delta * *e;
            *e = lambda * *e + self.last_input[i];
        }
        self.value_bias += delta * self.bias_trace;
        self.bias_trace = lambda * self.bias_trace + 1.0;

        // Policy moves toward the explored action only when the cell rate is open.
        if params.cell_alpha > 0.0 {
            for (k, row) in self
                .policy_weights
                .chunks_exact_mut(self.input_len)
                .enumerate()
            {
                let step = params.cell_alpha * (action[k] - self.prediction[k]);
                for (w, x) in row.iter_mut().zip(&self.last_input) {
                    *w += step * x;
                }
            }
        }

        trace!(
            tick = self.ticks,
            value = output[0],
            error = error[0],
            cell_alpha = params.cell_alpha,
            "linear region learned"
        );

        Ok(())
    }
}
