#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tracing::debug;

use crate::error::{check_len, Error, Result};
use crate::prng::RandomSource;
use crate::region::{OutputParams, ParameterRanges, Region, RegionTopology, TraceParams};

/// Hierarchy depth handed to `Region::create_random`.
pub const REGION_DEPTH: usize = 1;

/// Per-step hyperparameters for `Controller::step`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ControllerParams {
    /// Passed through to `Region::get_output`.
    pub output: OutputParams,
    /// Passed through to `Region::learn_traces`; `cell_alpha` is gated by the TD sign.
    pub trace: TraceParams,

    /// Learning rate for the single value output.
    pub weight_alpha: f32,
    /// Discount factor.
    pub gamma: f32,
    /// Eligibility trace decay.
    pub lambda: f32,
    /// Inverse time constant of the value trace.
    pub tau_inv: f32,

    /// Chance that a masked action entry is replaced by a uniform draw in [-1, 1).
    pub action_break_chance: f32,
    /// Standard deviation of the Gaussian perturbation otherwise added.
    pub action_perturbation_std_dev: f32,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            output: OutputParams::default(),
            trace: TraceParams::default(),
            weight_alpha: 0.02,
            gamma: 0.99,
            lambda: 0.95,
            tau_inv: 0.5,
            action_break_chance: 0.05,
            action_perturbation_std_dev: 0.05,
        }
    }
}

impl ControllerParams {
    pub fn validate(&self) -> Result<()> {
        let unit = |x: f32| (0.0..=1.0).contains(&x);
        if !self.weight_alpha.is_finite() || self.weight_alpha < 0.0 {
            return Err(Error::InvalidParameter("weight_alpha must be finite and >= 0"));
        }
        if !self.trace.cell_alpha.is_finite() || self.trace.cell_alpha < 0.0 {
            return Err(Error::InvalidParameter("cell_alpha must be finite and >= 0"));
        }
        if !unit(self.gamma) {
            return Err(Error::InvalidParameter("gamma must be in [0, 1]"));
        }
        if !unit(self.lambda) {
            return Err(Error::InvalidParameter("lambda must be in [0, 1]"));
        }
        if !(self.tau_inv > 0.0 && self.tau_inv <= 1.0) {
            return Err(Error::InvalidParameter("tau_inv must be in (0, 1]"));
        }
        if !unit(self.action_break_chance) {
            return Err(Error::InvalidParameter("action_break_chance must be in [0, 1]"));
        }
        if !self.action_perturbation_std_dev.is_finite() || self.action_perturbation_std_dev < 0.0 {
            return Err(Error::InvalidParameter(
                "action_perturbation_std_dev must be finite and >= 0",
            ));
        }
        Ok(())
    }

    /// Exploration settings.
    pub fn with_exploration(mut self, break_chance: f32, perturbation_std_dev: f32) -> Self {
        self.action_break_chance = break_chance;
        self.action_perturbation_std_dev = perturbation_std_dev;
        self
    }

    /// TD settings.
    pub fn with_td(mut self, gamma: f32, lambda: f32, tau_inv: f32) -> Self {
        self.gamma = gamma;
        self.lambda = lambda;
        self.tau_inv = tau_inv;
        self
    }
}

/// What one `Controller::step` computed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepReport {
    /// Raw value estimate from the region (`output[0]`).
    pub value: f32,
    /// Leaky-integrated TD target.
    pub new_adv: f32,
    /// `new_adv - prev_value`.
    pub td_error: f32,
    /// Cell learning rate actually handed to the region: `cell_alpha` or 0.
    pub cell_alpha: f32,
}

/// Temporal-difference action controller over a [`Region`].
///
/// Each step feeds the region the observation with action-masked entries
/// replaced by the previous emitted action, reads a value estimate and a
/// predicted action, perturbs the masked action entries, and trains the region
/// on a leaky-integrated TD error. Cell-level learning only runs on positive
/// TD error.
#[derive(Debug, Clone)]
pub struct Controller<G> {
    region: G,

    prev_value: f32,
    prev_prediction: Vec<f32>,

    merged: Vec<f32>,

    ticks: u64,
    last_report: Option<StepReport>,
}

impl<G: Region> Controller<G> {
    /// Build the region (depth 1) and zero the rolling state.
    pub fn create_random<R: RandomSource + ?Sized>(
        topology: &RegionTopology,
        ranges: &ParameterRanges,
        rng: &mut R,
    ) -> Result<Self> {
        let region = G::create_random(topology, ranges, REGION_DEPTH, rng)?;
        check_len("region input", topology.input_len(), region.input_len())?;
        Ok(Self::from_region(region))
    }

    /// Wrap an already-built region.
    pub fn from_region(region: G) -> Self {
        let n = region.input_len();
        Self {
            region,
            prev_value: 0.0,
            prev_prediction: vec![0.0; n],
            merged: Vec::with_capacity(n),
            ticks: 0,
            last_report: None,
        }
    }

    pub fn region(&self) -> &G {
        &self.region
    }

    pub fn region_mut(&mut self) -> &mut G {
        &mut self.region
    }

    pub fn into_region(self) -> G {
        self.region
    }

    pub fn input_len(&self) -> usize {
        self.prev_prediction.len()
    }

    pub fn prev_value(&self) -> f32 {
        self.prev_value
    }

    pub fn prev_prediction(&self) -> &[f32] {
        &self.prev_prediction
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    /// Advance one tick.
    ///
    /// `input`, `action_mask` and `action` must all have `input_len()` entries.
    /// On return `action` holds the exploratory action the region was trained
    /// toward; masked entries lie in [-1, 1].
    pub fn step<R: RandomSource + ?Sized>(
        &mut self,
        reward: f32,
        input: &[f32],
        action_mask: &[bool],
        action: &mut [f32],
        params: &ControllerParams,
        rng: &mut R,
    ) -> Result<StepReport> {
        let n = self.prev_prediction.len();
        check_len("input", n, input.len())?;
        check_len("action mask", n, action_mask.len())?;
        check_len("action", n, action.len())?;
        params.validate()?;

        self.region.step_begin();

        // Own previous action stands in for the raw observation on masked slots.
        self.merged.clear();
        self.merged.extend(
            input
                .iter()
                .zip(action_mask)
                .zip(&self.prev_prediction)
                .map(|((&x, &masked), &prev)| if masked { prev } else { x }),
        );

        let mut output = [0.0f32; 1];
        self.region
            .get_output(&self.merged, &mut output, None, &params.output, rng)?;
        self.region.get_prediction(action)?;

        explore(action, action_mask, params, rng);

        let value = output[0];
        let new_adv =
            self.prev_value + params.tau_inv * (reward + params.gamma * value - self.prev_value);
        let td_error = new_adv - self.prev_value;

        let cell_alpha = if td_error > 0.0 {
            params.trace.cell_alpha
        } else {
            0.0
        };
        let trace = TraceParams {
            cell_alpha,
            ..params.trace
        };
        self.region.learn_traces(
            action,
            &output,
            None,
            &[td_error],
            &[params.weight_alpha],
            &trace,
            &[params.lambda],
        )?;

        // Rolling state only advances once the region has learned from this tick.
        // Bootstrap from the raw estimate, not the smoothed target.
        self.prev_value = value;
        self.prev_prediction.copy_from_slice(action);
        self.ticks += 1;

        let report = StepReport {
            value,
            new_adv,
            td_error,
            cell_alpha,
        };
        debug!(
            tick = self.ticks,
            reward,
            value,
            new_adv,
            td_error,
            "controller step"
        );
        self.last_report = Some(report);
        Ok(report)
    }
}

/// Perturb masked entries: an undirected break with probability
/// `action_break_chance`, otherwise Gaussian noise clamped to [-1, 1].
fn explore<R: RandomSource + ?Sized>(
    action: &mut [f32],
    action_mask: &[bool],
    params: &ControllerParams,
    rng: &mut R,
) {
    for (a, &masked) in action.iter_mut().zip(action_mask) {
        if !masked {
            continue;
        }
        *a = if rng.uniform(0.0, 1.0) < params.action_break_chance {
            rng.uniform(-1.0, 1.0)
        } else {
            // max/min rather than clamp so a NaN prediction lands on -1.
            (*a + rng.gaussian(0.0, params.action_perturbation_std_dev))
                .max(-1.0)
                .min(1.0)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_region::LinearRegion;
    use crate::prng::Prng;

    /// Region double that replays scripted values and records what it was fed.
    #[derive(Debug, Default)]
    struct RecordingRegion {
        input_len: usize,
        values: Vec<f32>,
        prediction: Vec<f32>,
        begins: usize,
        inputs: Vec<Vec<f32>>,
        cell_alphas: Vec<f32>,
        errors: Vec<f32>,
        targets: Vec<Vec<f32>>,
    }

    impl RecordingRegion {
        fn new(prediction: &[f32], values: &[f32]) -> Self {
            Self {
                input_len: prediction.len(),
                values: values.to_vec(),
                prediction: prediction.to_vec(),
                ..Default::default()
            }
        }
    }

    impl Region for RecordingRegion {
        fn create_random<R: RandomSource + ?Sized>(
            topology: &RegionTopology,
            _ranges: &ParameterRanges,
            depth: usize,
            _rng: &mut R,
        ) -> Result<Self> {
            assert_eq!(depth, REGION_DEPTH);
            Ok(Self::new(&vec![0.0; topology.input_len()], &[0.0]))
        }

        fn input_len(&self) -> usize {
            self.input_len
        }

        fn step_begin(&mut self) {
            self.begins += 1;
        }

        fn get_output<R: RandomSource + ?Sized>(
            &mut self,
            input: &[f32],
            output: &mut [f32],
            _mask: Option<&[bool]>,
            _params: &OutputParams,
            _rng: &mut R,
        ) -> Result<()> {
            let idx = self.inputs.len() % self.values.len();
            output[0] = self.values[idx];
            self.inputs.push(input.to_vec());
            Ok(())
        }

        fn get_prediction(&self, action: &mut [f32]) -> Result<()> {
            action.copy_from_slice(&self.prediction);
            Ok(())
        }

        fn learn_traces(
            &mut self,
            action: &[f32],
            _output: &[f32],
            _mask: Option<&[bool]>,
            error: &[f32],
            _weight_alphas: &[f32],
            params: &TraceParams,
            _output_lambdas: &[f32],
        ) -> Result<()> {
            self.cell_alphas.push(params.cell_alpha);
            self.errors.push(error[0]);
            self.targets.push(action.to_vec());
            Ok(())
        }
    }

    fn quiet_params() -> ControllerParams {
        ControllerParams::default()
            .with_exploration(0.0, 0.0)
            .with_td(0.0, 0.9, 1.0)
    }

    #[test]
    fn create_random_zeroes_rolling_state() {
        let mut rng = Prng::new(1);
        let topology = RegionTopology::with_input(3, 2);
        let ctl: Controller<RecordingRegion> =
            Controller::create_random(&topology, &ParameterRanges::default(), &mut rng).unwrap();
        assert_eq!(ctl.prev_value(), 0.0);
        assert_eq!(ctl.prev_prediction(), &[0.0; 6]);
        assert_eq!(ctl.ticks(), 0);
        assert!(ctl.last_report().is_none());
    }

    #[test]
    fn unmasked_input_reaches_region_unchanged() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.3, -0.2, 0.9], &[0.5]));
        let mut rng = Prng::new(2);
        let mut action = [0.0; 3];
        let params = ControllerParams::default();

        let inputs = [[0.1, 0.2, 0.3], [-7.5, 1e-7, 3.25], [0.0, -0.0, 42.0]];
        for input in &inputs {
            ctl.step(1.0, input, &[false; 3], &mut action, &params, &mut rng)
                .unwrap();
        }

        for (fed, raw) in ctl.region().inputs.iter().zip(&inputs) {
            let fed: Vec<u32> = fed.iter().map(|x| x.to_bits()).collect();
            let raw: Vec<u32> = raw.iter().map(|x| x.to_bits()).collect();
            assert_eq!(fed, raw);
        }
        assert_eq!(ctl.region().begins, 3);
    }

    #[test]
    fn masked_slots_carry_previous_action() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.25, 0.75], &[0.0]));
        let mut rng = Prng::new(3);
        let mut action = [0.0; 2];
        let params = quiet_params();
        let mask = [false, true];

        ctl.step(0.0, &[1.0, 9.0], &mask, &mut action, &params, &mut rng)
            .unwrap();
        ctl.step(0.0, &[2.0, 9.0], &mask, &mut action, &params, &mut rng)
            .unwrap();

        let fed = &ctl.region().inputs;
        assert_eq!(fed[0], vec![1.0, 0.0]);
        // No exploration noise: the emitted action equals the prediction.
        assert_eq!(fed[1], vec![2.0, 0.75]);
        assert_eq!(ctl.prev_prediction(), &[0.25, 0.75]);
    }

    #[test]
    fn exploration_only_touches_masked_entries_and_stays_bounded() {
        let mut ctl =
            Controller::from_region(RecordingRegion::new(&[5.0, -3.0, 0.5, 2.0], &[0.1]));
        let mut rng = Prng::new(4);
        let mut action = [0.0; 4];
        let mask = [true, true, true, false];
        let params = ControllerParams::default().with_exploration(0.3, 2.0);

        for _ in 0..500 {
            ctl.step(0.5, &[0.0; 4], &mask, &mut action, &params, &mut rng)
                .unwrap();
            for (a, &m) in action.iter().zip(&mask) {
                if m {
                    assert!((-1.0..=1.0).contains(a), "masked action {a}");
                }
            }
            assert_eq!(action[3], 2.0);
        }
    }

    #[test]
    fn certain_break_ignores_the_prediction() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.5; 8], &[0.0]));
        let mut rng = Prng::new(5);
        let mut action = [0.0; 8];
        let params = ControllerParams::default().with_exploration(1.0, 0.0);

        ctl.step(0.0, &[0.0; 8], &[true; 8], &mut action, &params, &mut rng)
            .unwrap();
        assert!(action.iter().all(|a| (-1.0..1.0).contains(a)));
        assert!(action.iter().any(|&a| a != 0.5));
    }

    #[test]
    fn td_update_uses_raw_value_for_bootstrap() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.0], &[2.0, 3.0]));
        let mut rng = Prng::new(6);
        let mut action = [0.0];
        let params = ControllerParams::default()
            .with_exploration(0.0, 0.0)
            .with_td(0.5, 0.9, 0.5);

        // new_adv = 0 + 0.5 * (1 + 0.5*2 - 0) = 1
        let r1 = ctl
            .step(1.0, &[0.0], &[false], &mut action, &params, &mut rng)
            .unwrap();
        assert_eq!(r1.value, 2.0);
        assert_eq!(r1.new_adv, 1.0);
        assert_eq!(r1.td_error, 1.0);
        assert_eq!(ctl.prev_value(), 2.0);

        // new_adv = 2 + 0.5 * (1 + 0.5*3 - 2) = 2.25
        let r2 = ctl
            .step(1.0, &[0.0], &[false], &mut action, &params, &mut rng)
            .unwrap();
        assert_eq!(r2.new_adv, 2.25);
        assert_eq!(r2.td_error, 0.25);
        assert_eq!(ctl.prev_value(), 3.0);
        assert_eq!(ctl.region().errors, vec![1.0, 0.25]);
        assert_eq!(ctl.last_report(), Some(&r2));
    }

    #[test]
    fn cell_rate_is_gated_by_td_sign() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.0, 0.0], &[0.0]));
        let mut rng = Prng::new(7);
        let mut action = [0.0; 2];
        let mut params = quiet_params();
        params.trace.cell_alpha = 0.125;

        // gamma = 0, tau_inv = 1, value always 0: td_error == reward.
        for reward in [1.0, -1.0, 0.0, 0.5, -0.25] {
            let report = ctl
                .step(reward, &[0.0; 2], &[true, false], &mut action, &params, &mut rng)
                .unwrap();
            if report.td_error > 0.0 {
                assert_eq!(report.cell_alpha, 0.125);
            } else {
                assert_eq!(report.cell_alpha, 0.0);
            }
        }
        assert_eq!(ctl.region().cell_alphas, vec![0.125, 0.0, 0.0, 0.125, 0.0]);
    }

    #[test]
    fn region_trains_toward_the_explored_action() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.2, 0.2], &[0.0]));
        let mut rng = Prng::new(8);
        let mut action = [0.0; 2];
        let params = ControllerParams::default().with_exploration(0.5, 0.3);

        ctl.step(1.0, &[0.0; 2], &[true, false], &mut action, &params, &mut rng)
            .unwrap();
        assert_eq!(ctl.region().targets[0], action.to_vec());
    }

    #[test]
    fn seeded_runs_are_bit_identical() {
        let topology = RegionTopology::with_input(4, 1);
        let ranges = ParameterRanges::default();
        let params = ControllerParams::default().with_exploration(0.1, 0.2);
        let mask = [false, false, true, true];

        let run = || {
            let mut rng = Prng::new(77);
            let mut ctl: Controller<LinearRegion> =
                Controller::create_random(&topology, &ranges, &mut rng).unwrap();
            let mut action = [0.0; 4];
            let mut trace = Vec::new();
            for t in 0..200 {
                let x = (t as f32 * 0.1).sin();
                let reward = -(x - action[2]).abs();
                let report = ctl
                    .step(reward, &[x, 1.0, 0.0, 0.0], &mask, &mut action, &params, &mut rng)
                    .unwrap();
                trace.push(report.new_adv.to_bits());
                trace.extend(action.iter().map(|a| a.to_bits()));
            }
            trace
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.0; 3], &[0.0]));
        let mut rng = Prng::new(9);
        let params = ControllerParams::default();

        let mut action = [0.0; 3];
        assert_eq!(
            ctl.step(0.0, &[0.0; 2], &[false; 3], &mut action, &params, &mut rng),
            Err(Error::DimensionMismatch {
                what: "input",
                expected: 3,
                actual: 2
            })
        );
        assert!(matches!(
            ctl.step(0.0, &[0.0; 3], &[false; 4], &mut action, &params, &mut rng),
            Err(Error::DimensionMismatch { what: "action mask", .. })
        ));
        let mut short = [0.0; 1];
        assert!(matches!(
            ctl.step(0.0, &[0.0; 3], &[false; 3], &mut short, &params, &mut rng),
            Err(Error::DimensionMismatch { what: "action", .. })
        ));
        // Rejected calls never reach the region.
        assert_eq!(ctl.region().begins, 0);
        assert_eq!(ctl.ticks(), 0);
    }

    /// Region double whose learning call always fails.
    struct RejectingRegion;

    impl Region for RejectingRegion {
        fn create_random<R: RandomSource + ?Sized>(
            _topology: &RegionTopology,
            _ranges: &ParameterRanges,
            _depth: usize,
            _rng: &mut R,
        ) -> Result<Self> {
            Ok(Self)
        }

        fn input_len(&self) -> usize {
            1
        }

        fn step_begin(&mut self) {}

        fn get_output<R: RandomSource + ?Sized>(
            &mut self,
            _input: &[f32],
            output: &mut [f32],
            _mask: Option<&[bool]>,
            _params: &OutputParams,
            _rng: &mut R,
        ) -> Result<()> {
            output[0] = 5.0;
            Ok(())
        }

        fn get_prediction(&self, action: &mut [f32]) -> Result<()> {
            action[0] = 0.5;
            Ok(())
        }

        fn learn_traces(
            &mut self,
            _action: &[f32],
            _output: &[f32],
            _mask: Option<&[bool]>,
            _error: &[f32],
            _weight_alphas: &[f32],
            _params: &TraceParams,
            _output_lambdas: &[f32],
        ) -> Result<()> {
            Err(Error::Precondition("learning disabled"))
        }
    }

    #[test]
    fn failed_learning_leaves_rolling_state_untouched() {
        let mut ctl = Controller::from_region(RejectingRegion);
        let mut rng = Prng::new(11);
        let mut action = [0.0];

        let err = ctl
            .step(1.0, &[0.0], &[true], &mut action, &quiet_params(), &mut rng)
            .unwrap_err();
        assert_eq!(err, Error::Precondition("learning disabled"));
        assert_eq!(ctl.prev_value(), 0.0);
        assert_eq!(ctl.prev_prediction(), &[0.0]);
        assert_eq!(ctl.ticks(), 0);
        assert!(ctl.last_report().is_none());
    }

    #[test]
    fn gamma_above_one_is_rejected() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.0], &[0.0]));
        let mut rng = Prng::new(12);
        let mut action = [0.0];
        let params = ControllerParams::default().with_td(1.5, 0.9, 0.5);
        assert_eq!(
            ctl.step(0.0, &[0.0], &[false], &mut action, &params, &mut rng),
            Err(Error::InvalidParameter("gamma must be in [0, 1]"))
        );
        assert_eq!(ctl.region().begins, 0);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let mut ctl = Controller::from_region(RecordingRegion::new(&[0.0], &[0.0]));
        let mut rng = Prng::new(10);
        let mut action = [0.0];
        let params = ControllerParams::default().with_td(0.9, 0.9, 0.0);
        assert!(matches!(
            ctl.step(0.0, &[0.0], &[false], &mut action, &params, &mut rng),
            Err(Error::InvalidParameter(_))
        ));
    }
}
