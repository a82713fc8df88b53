#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tracing::{trace, warn};

use crate::error::{check_len, Error, Result};
use crate::prng::RandomSource;

/// Type alias for connection weights.
pub type Weight = f32;

/// Execution tier for `activate()`, `reconstruct()` and `learn()`.
///
/// - `Scalar`: Single-threaded (default, works everywhere)
/// - `Parallel`: Per-unit work spread over rayon's pool
///
/// Both tiers run the same per-unit arithmetic in the same order, so their
/// results are bit-identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    /// Single-threaded scalar execution.
    #[default]
    Scalar,
    /// Multi-threaded execution (requires `parallel` feature).
    Parallel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VisibleUnit {
    pub input: f32,
    pub reconstruction: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HiddenUnit {
    pub bias: f32,
    /// Pre-inhibition drive.
    pub activation: f32,
    /// Post-inhibition output, never negative.
    pub state: f32,
}

/// Step sizes for `SparseCoder::learn`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LearningRates {
    /// Lateral (inhibitory) weight rate.
    pub alpha: f32,
    /// Feedforward weight rate.
    pub beta: f32,
    /// Homeostatic bias rate.
    pub gamma: f32,
    /// Target mean activity per hidden unit.
    pub sparsity: f32,
}

impl Default for LearningRates {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: 0.005,
            gamma: 0.02,
            sparsity: 0.05,
        }
    }
}

impl LearningRates {
    pub fn validate(&self) -> Result<()> {
        for rate in [self.alpha, self.beta, self.gamma] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(Error::InvalidParameter(
                    "learning rates must be finite and >= 0",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.sparsity) {
            return Err(Error::InvalidParameter("sparsity must be in [0, 1]"));
        }
        Ok(())
    }

    pub fn with_sparsity(mut self, sparsity: f32) -> Self {
        self.sparsity = sparsity;
        self
    }
}

/// Where the coder is in its activate -> reconstruct -> learn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Idle,
    Activated,
    Reconstructed,
}

/// Lateral-inhibition sparse coder.
///
/// Hidden units compete through learned non-positive lateral weights: a unit is
/// suppressed in proportion to how far its neighbours' raw activations exceed
/// its own. Weights live in flat row-major arrays; row `i` of `feedforward` holds
/// hidden unit `i`'s weights over the visible layer, row `i` of `lateral` its
/// weights over every hidden unit (self included, always zero).
///
/// Call order per input is `set_input` → `activate` → `reconstruct` → `learn`;
/// out-of-order calls are rejected with `Error::Precondition`.
#[derive(Debug, Clone)]
pub struct SparseCoder {
    visible: Vec<VisibleUnit>,
    hidden: Vec<HiddenUnit>,

    feedforward: Vec<Weight>,
    lateral: Vec<Weight>,

    // Reused buffer for first-pass activations and learning errors.
    scratch: Vec<f32>,

    pass: Pass,
    tier: ExecutionTier,
}

impl SparseCoder {
    /// Allocate `num_hidden` units over `num_visible` inputs with random weights.
    ///
    /// Each feedforward row is drawn from `uniform[0,1)` and multiplied by
    /// `1 / Σw²`. Each lateral row is drawn from `-uniform[0,1)` and scaled the
    /// same way, then its self-weight is zeroed. Note the scale is the inverse
    /// sum of squares, not the inverse norm.
    pub fn create_random<R: RandomSource + ?Sized>(
        num_visible: usize,
        num_hidden: usize,
        rng: &mut R,
    ) -> Result<Self> {
        check_sizes(num_visible, num_hidden)?;

        let mut feedforward = Vec::with_capacity(num_hidden * num_visible);
        let mut lateral = Vec::with_capacity(num_hidden * num_hidden);

        for hi in 0..num_hidden {
            push_scaled_draws(rng, &mut feedforward, num_visible, 1.0, hi)?;

            let row_start = lateral.len();
            push_scaled_draws(rng, &mut lateral, num_hidden, -1.0, hi)?;
            lateral[row_start + hi] = 0.0;
        }

        Ok(Self::assemble(
            num_visible,
            vec![HiddenUnit::default(); num_hidden],
            feedforward,
            lateral,
        ))
    }

    /// Build a coder from explicit row-major weights.
    ///
    /// `lateral` must already satisfy the inhibitory invariants: zero diagonal
    /// and no positive entries.
    pub fn from_weights(
        num_visible: usize,
        num_hidden: usize,
        feedforward: Vec<Weight>,
        lateral: Vec<Weight>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        check_sizes(num_visible, num_hidden)?;
        check_len("feedforward weights", num_hidden * num_visible, feedforward.len())?;
        check_len("lateral weights", num_hidden * num_hidden, lateral.len())?;
        check_len("biases", num_hidden, biases.len())?;

        for (idx, &value) in lateral.iter().enumerate() {
            let (row, col) = (idx / num_hidden, idx % num_hidden);
            let ok = value.is_finite() && value <= 0.0 && (row != col || value == 0.0);
            if !ok {
                return Err(Error::InvalidLateralWeight { row, col, value });
            }
        }

        let hidden = biases
            .into_iter()
            .map(|bias| HiddenUnit {
                bias,
                ..HiddenUnit::default()
            })
            .collect();

        Ok(Self::assemble(num_visible, hidden, feedforward, lateral))
    }

    fn assemble(
        num_visible: usize,
        hidden: Vec<HiddenUnit>,
        feedforward: Vec<Weight>,
        lateral: Vec<Weight>,
    ) -> Self {
        let scratch = Vec::with_capacity(hidden.len().max(num_visible));
        Self {
            visible: vec![VisibleUnit::default(); num_visible],
            hidden,
            feedforward,
            lateral,
            scratch,
            pass: Pass::Idle,
            tier: ExecutionTier::Scalar,
        }
    }

    pub fn with_execution_tier(mut self, tier: ExecutionTier) -> Self {
        self.set_execution_tier(tier);
        self
    }

    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        if tier == ExecutionTier::Parallel && !cfg!(feature = "parallel") {
            warn!("parallel tier requested without the `parallel` feature; running scalar");
        }
        self.tier = tier;
    }

    pub fn execution_tier(&self) -> ExecutionTier {
        self.tier
    }

    /// The tier that will actually run, accounting for compiled features.
    pub fn effective_execution_tier(&self) -> ExecutionTier {
        match self.tier {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }

    pub fn num_visible(&self) -> usize {
        self.visible.len()
    }

    pub fn num_hidden(&self) -> usize {
        self.hidden.len()
    }

    pub fn visible_units(&self) -> &[VisibleUnit] {
        &self.visible
    }

    pub fn hidden_units(&self) -> &[HiddenUnit] {
        &self.hidden
    }

    /// Feedforward weights of hidden unit `hi`, one per visible unit.
    pub fn feedforward_weights(&self, hi: usize) -> &[Weight] {
        let nv = self.visible.len();
        &self.feedforward[hi * nv..(hi + 1) * nv]
    }

    /// Lateral weights of hidden unit `hi`, one per hidden unit.
    pub fn lateral_weights(&self, hi: usize) -> &[Weight] {
        let nh = self.hidden.len();
        &self.lateral[hi * nh..(hi + 1) * nh]
    }

    pub fn bias(&self, hi: usize) -> f32 {
        self.hidden[hi].bias
    }

    pub fn states(&self) -> impl Iterator<Item = f32> + '_ {
        self.hidden.iter().map(|h| h.state)
    }

    pub fn activations(&self) -> impl Iterator<Item = f32> + '_ {
        self.hidden.iter().map(|h| h.activation)
    }

    pub fn reconstructions(&self) -> impl Iterator<Item = f32> + '_ {
        self.visible.iter().map(|v| v.reconstruction)
    }

    /// Σ (input − reconstruction)² over the visible layer.
    pub fn reconstruction_error(&self) -> f32 {
        self.visible
            .iter()
            .map(|v| {
                let e = v.input - v.reconstruction;
                e * e
            })
            .sum()
    }

    /// Load the next observation into the visible layer.
    pub fn set_input(&mut self, input: &[f32]) -> Result<()> {
        check_len("visible input", self.visible.len(), input.len())?;
        for (v, &x) in self.visible.iter_mut().zip(input) {
            v.input = x;
        }
        self.pass = Pass::Idle;
        Ok(())
    }

    /// Compute raw activations, then inhibited states.
    ///
    /// The inhibition pass reads only first-pass activations, never states
    /// produced during the same pass.
    pub fn activate(&mut self) {
        match self.effective_execution_tier() {
            ExecutionTier::Scalar => self.activate_scalar(),
            ExecutionTier::Parallel => self.activate_parallel(),
        }
        self.pass = Pass::Activated;
    }

    fn activate_scalar(&mut self) {
        let nv = self.visible.len();
        let nh = self.hidden.len();

        for (h, row) in self.hidden.iter_mut().zip(self.feedforward.chunks_exact(nv)) {
            h.activation = feedforward_drive(row, &self.visible, h.bias);
        }

        let mut acts = core::mem::take(&mut self.scratch);
        acts.clear();
        acts.extend(self.hidden.iter().map(|h| h.activation));

        for (h, row) in self.hidden.iter_mut().zip(self.lateral.chunks_exact(nh)) {
            h.state = inhibited_state(row, &acts, h.activation);
        }

        self.scratch = acts;
    }

    #[cfg(feature = "parallel")]
    fn activate_parallel(&mut self) {
        let nv = self.visible.len();
        let nh = self.hidden.len();
        let visible = &self.visible;

        self.hidden
            .par_iter_mut()
            .zip(self.feedforward.par_chunks_exact(nv))
            .for_each(|(h, row)| h.activation = feedforward_drive(row, visible, h.bias));

        let mut acts = core::mem::take(&mut self.scratch);
        acts.clear();
        acts.extend(self.hidden.iter().map(|h| h.activation));

        let acts_ref = &acts;
        self.hidden
            .par_iter_mut()
            .zip(self.lateral.par_chunks_exact(nh))
            .for_each(|(h, row)| h.state = inhibited_state(row, acts_ref, h.activation));

        self.scratch = acts;
    }

    #[cfg(not(feature = "parallel"))]
    fn activate_parallel(&mut self) {
        self.activate_scalar();
    }

    /// Linear readout of the hidden states back onto the visible layer.
    ///
    /// Requires `activate()` on the current input.
    pub fn reconstruct(&mut self) -> Result<()> {
        if self.pass == Pass::Idle {
            return Err(Error::Precondition("reconstruct() requires activate() first"));
        }

        match self.effective_execution_tier() {
            ExecutionTier::Scalar => self.reconstruct_scalar(),
            ExecutionTier::Parallel => self.reconstruct_parallel(),
        }

        self.pass = Pass::Reconstructed;
        Ok(())
    }

    fn reconstruct_scalar(&mut self) {
        let nv = self.visible.len();
        let (hidden, feedforward) = (&self.hidden, &self.feedforward);
        for (vi, v) in self.visible.iter_mut().enumerate() {
            v.reconstruction = readout(feedforward, hidden, nv, vi);
        }
    }

    #[cfg(feature = "parallel")]
    fn reconstruct_parallel(&mut self) {
        let nv = self.visible.len();
        let (hidden, feedforward) = (&self.hidden, &self.feedforward);
        self.visible
            .par_iter_mut()
            .enumerate()
            .for_each(|(vi, v)| v.reconstruction = readout(feedforward, hidden, nv, vi));
    }

    #[cfg(not(feature = "parallel"))]
    fn reconstruct_parallel(&mut self) {
        self.reconstruct_scalar();
    }

    /// One online learning update from the current activate/reconstruct pass.
    ///
    /// - feedforward: `w[i][v] += beta * [state_i > 0] * (input_v - recon_v)`
    /// - lateral: `w[i][j] = min(0, w[i][j] - alpha * (s_i*s_j - sparsity²))`, self-weight 0
    /// - bias: `b_i += gamma * (s_i - sparsity)`
    ///
    /// followed by a symmetrization pass that sets `w[i][j]` and `w[j][i]` to
    /// their mean.
    pub fn learn(&mut self, rates: &LearningRates) -> Result<()> {
        if self.pass != Pass::Reconstructed {
            return Err(Error::Precondition(
                "learn() requires activate() and reconstruct() on the current input",
            ));
        }
        rates.validate()?;

        let mut errors = core::mem::take(&mut self.scratch);
        errors.clear();
        errors.extend(self.visible.iter().map(|v| v.input - v.reconstruction));

        let nh = self.hidden.len();
        let update = UnitUpdate {
            rates,
            sparsity_sq: rates.sparsity * rates.sparsity,
            errors: &errors,
        };

        let bias_deltas = match self.effective_execution_tier() {
            ExecutionTier::Scalar => self.learn_rows_scalar(&update),
            ExecutionTier::Parallel => self.learn_rows_parallel(&update),
        };
        for (h, delta) in self.hidden.iter_mut().zip(bias_deltas) {
            h.bias += delta;
        }

        symmetrize(&mut self.lateral, nh);

        trace!(
            active = self.hidden.iter().filter(|h| h.state > 0.0).count(),
            "sparse coder learned"
        );

        self.scratch = errors;
        self.pass = Pass::Idle;
        Ok(())
    }

    // States are read-only while rows update, so updating row by row is the
    // same as buffering every row first.
    fn learn_rows_scalar(&mut self, update: &UnitUpdate<'_>) -> Vec<f32> {
        let nv = self.visible.len();
        let nh = self.hidden.len();
        let states: &[HiddenUnit] = &self.hidden;
        self.feedforward
            .chunks_exact_mut(nv)
            .zip(self.lateral.chunks_exact_mut(nh))
            .enumerate()
            .map(|(hi, (ff_row, lat_row))| update.apply(hi, states, ff_row, lat_row))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn learn_rows_parallel(&mut self, update: &UnitUpdate<'_>) -> Vec<f32> {
        let nv = self.visible.len();
        let nh = self.hidden.len();
        let states: &[HiddenUnit] = &self.hidden;
        self.feedforward
            .par_chunks_exact_mut(nv)
            .zip(self.lateral.par_chunks_exact_mut(nh))
            .enumerate()
            .map(|(hi, (ff_row, lat_row))| update.apply(hi, states, ff_row, lat_row))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn learn_rows_parallel(&mut self, update: &UnitUpdate<'_>) -> Vec<f32> {
        self.learn_rows_scalar(update)
    }

    /// Run one full cycle on `input` and return the squared reconstruction
    /// error measured before the weights were updated.
    pub fn step(&mut self, input: &[f32], rates: &LearningRates) -> Result<f32> {
        self.set_input(input)?;
        self.activate();
        self.reconstruct()?;
        let error = self.reconstruction_error();
        self.learn(rates)?;
        Ok(error)
    }
}

struct UnitUpdate<'a> {
    rates: &'a LearningRates,
    sparsity_sq: f32,
    errors: &'a [f32],
}

impl UnitUpdate<'_> {
    /// Update one unit's weight rows in place; returns its bias delta.
    fn apply(
        &self,
        hi: usize,
        hidden: &[HiddenUnit],
        ff_row: &mut [Weight],
        lat_row: &mut [Weight],
    ) -> f32 {
        let state = hidden[hi].state;

        // Binary gate: active units learn the full error, silent units nothing.
        if state > 0.0 {
            for (w, &e) in ff_row.iter_mut().zip(self.errors) {
                *w += self.rates.beta * e;
            }
        }

        for (w, other) in lat_row.iter_mut().zip(hidden) {
            *w = (*w - self.rates.alpha * (state * other.state - self.sparsity_sq)).min(0.0);
        }
        lat_row[hi] = 0.0;

        self.rates.gamma * (state - self.rates.sparsity)
    }
}

fn check_sizes(num_visible: usize, num_hidden: usize) -> Result<()> {
    if num_visible == 0 {
        return Err(Error::InvalidDimensions {
            what: "num_visible",
            value: num_visible,
        });
    }
    if num_hidden == 0 {
        return Err(Error::InvalidDimensions {
            what: "num_hidden",
            value: num_hidden,
        });
    }
    Ok(())
}

/// Append `n` draws of `sign * uniform[0,1)` scaled by their inverse sum of squares.
fn push_scaled_draws<R: RandomSource + ?Sized>(
    rng: &mut R,
    out: &mut Vec<Weight>,
    n: usize,
    sign: f32,
    unit: usize,
) -> Result<()> {
    let start = out.len();
    let mut dist2 = 0.0f32;
    for _ in 0..n {
        let w = sign * rng.uniform(0.0, 1.0);
        dist2 += w * w;
        out.push(w);
    }

    let scale = 1.0 / dist2;
    if !scale.is_finite() {
        return Err(Error::DegenerateNormalization { unit });
    }
    for w in &mut out[start..] {
        *w *= scale;
    }
    Ok(())
}

#[inline]
fn feedforward_drive(row: &[Weight], visible: &[VisibleUnit], bias: f32) -> f32 {
    let mut sum = -bias;
    for (w, v) in row.iter().zip(visible) {
        sum += w * v.input;
    }
    sum
}

#[inline]
fn inhibited_state(row: &[Weight], activations: &[f32], own: f32) -> f32 {
    let mut sum = own;
    for (w, &other) in row.iter().zip(activations) {
        sum += w * (other - own).max(0.0);
    }
    sum.max(0.0)
}

/// Visible unit `vi`'s reconstruction: column `vi` of the feedforward matrix
/// dotted with the hidden states.
#[inline]
fn readout(feedforward: &[Weight], hidden: &[HiddenUnit], nv: usize, vi: usize) -> f32 {
    let mut sum = 0.0;
    for (hi, h) in hidden.iter().enumerate() {
        sum += feedforward[hi * nv + vi] * h.state;
    }
    sum
}

fn symmetrize(lateral: &mut [Weight], n: usize) {
    for i in 0..n {
        for j in (i + 1)..n {
            let mean = 0.5 * (lateral[i * n + j] + lateral[j * n + i]);
            lateral[i * n + j] = mean;
            lateral[j * n + i] = mean;
        }
    }
}
