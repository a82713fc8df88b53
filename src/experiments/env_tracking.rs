use std::collections::VecDeque;
use std::io;
use std::io::Write;

use sparse_td::config::RunConfig;
use sparse_td::controller::Controller;
use sparse_td::error::{Error, Result};
use sparse_td::linear_region::LinearRegion;
use sparse_td::observer::ControllerAdapter;
use sparse_td::prng::{Prng, RandomSource};
use tracing::info;

/// Observation layout: error to target, own position, own last action.
const TRACKING_INPUT_LEN: usize = 3;
const ACTION_SLOT: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct TrackingConfig {
    /// Largest position change per step, reached at action = +/-1.
    pub max_speed: f32,
    /// Std dev of the target's per-step random walk.
    pub target_drift: f32,
    /// Window for the moving average of absolute error.
    pub window: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_speed: 0.1,
            target_drift: 0.02,
            window: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSummary {
    pub steps: usize,
    pub mean_abs_error: f32,
    pub recent_abs_error: f32,
    pub cumulative_reward: f32,
}

#[derive(Debug, Clone)]
struct TrackingState {
    target: f32,
    position: f32,
    steps: usize,
    abs_error_sum: f32,
    cumulative_reward: f32,
    recent: VecDeque<f32>,
    rng: Prng,
}

impl TrackingState {
    fn new(seed: u64) -> Self {
        let mut rng = Prng::new(seed);
        Self {
            target: rng.uniform(-0.5, 0.5),
            position: 0.0,
            steps: 0,
            abs_error_sum: 0.0,
            cumulative_reward: 0.0,
            recent: VecDeque::new(),
            rng,
        }
    }

    fn observation(&self) -> [f32; TRACKING_INPUT_LEN] {
        [self.target - self.position, self.position, 0.0]
    }

    /// Keep the last `window` absolute errors.
    fn push_recent(&mut self, abs_error: f32, window: usize) {
        self.recent.push_back(abs_error);
        while self.recent.len() > window.max(1) {
            self.recent.pop_front();
        }
    }

    fn recent_mean(&self) -> f32 {
        if self.recent.is_empty() {
            0.0
        } else {
            self.recent.iter().sum::<f32>() / self.recent.len() as f32
        }
    }
}

/// Drive a controller that must keep its position on a drifting 1-D target.
pub fn run_tracking_demo(run: &RunConfig, cfg: TrackingConfig) -> Result<TrackingSummary> {
    let topology = &run.control.topology;
    if topology.input_len() != TRACKING_INPUT_LEN {
        return Err(Error::DimensionMismatch {
            what: "tracking topology input",
            expected: TRACKING_INPUT_LEN,
            actual: topology.input_len(),
        });
    }

    let mut rng = Prng::new(run.seed);
    let mut controller: Controller<LinearRegion> =
        Controller::create_random(topology, &run.control.ranges, &mut rng)?;
    let params = run.control.params;

    let mut env = TrackingState::new(run.seed.wrapping_add(1));
    let mut mask = [false; TRACKING_INPUT_LEN];
    mask[ACTION_SLOT] = true;
    let mut action = [0.0f32; TRACKING_INPUT_LEN];

    info!(
        steps = run.steps,
        max_speed = cfg.max_speed,
        target_drift = cfg.target_drift,
        "control-demo start"
    );
    if out_line(format_args!(
        "control-demo: steps={}, max_speed={:.2}, target_drift={:.3}",
        run.steps, cfg.max_speed, cfg.target_drift
    ))
    .is_err()
    {
        return Ok(summary(&env));
    }

    // Reward for the state the previous action produced.
    let mut reward = 0.0f32;

    while env.steps < run.steps {
        env.steps += 1;

        let obs = env.observation();
        controller.step(reward, &obs, &mask, &mut action, &params, &mut rng)?;

        env.position = (env.position + cfg.max_speed * action[ACTION_SLOT]).clamp(-1.0, 1.0);
        env.target = (env.target + env.rng.gaussian(0.0, cfg.target_drift)).clamp(-1.0, 1.0);

        let abs_error = (env.target - env.position).abs();
        reward = -abs_error;
        env.abs_error_sum += abs_error;
        env.cumulative_reward += reward;

        env.push_recent(abs_error, cfg.window);

        if run.report_every > 0 && env.steps.is_multiple_of(run.report_every) {
            let snap = ControllerAdapter::new(&controller).snapshot();
            info!(
                tick = snap.ticks,
                prev_value = snap.prev_value,
                td_error = snap.last_report.map(|r| r.td_error),
                "controller snapshot"
            );
            if out_line(format_args!(
                "step={} target={:+.3} position={:+.3} recent_abs_error={:.3} value={:+.3}",
                env.steps,
                env.target,
                env.position,
                env.recent_mean(),
                snap.prev_value
            ))
            .is_err()
            {
                return Ok(summary(&env));
            }
        }
    }

    let result = summary(&env);
    let _ = out_line(format_args!(
        "control-demo done: mean_abs_error={:.3} recent_abs_error={:.3} cumulative_reward={:.1}",
        result.mean_abs_error, result.recent_abs_error, result.cumulative_reward
    ));
    if let Ok(json) = serde_json::to_string(&ControllerAdapter::new(&controller).snapshot()) {
        let _ = out_line(format_args!("  final_snapshot={json}"));
    }
    Ok(result)
}

fn summary(env: &TrackingState) -> TrackingSummary {
    TrackingSummary {
        steps: env.steps,
        mean_abs_error: if env.steps == 0 {
            0.0
        } else {
            env.abs_error_sum / env.steps as f32
        },
        recent_abs_error: env.recent_mean(),
        cumulative_reward: env.cumulative_reward,
    }
}

pub(crate) fn out_line(args: std::fmt::Arguments<'_>) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_fmt(args)?;
    out.write_all(b"\n")
}
